//! Request extractors whose rejections render as `AppError`.
//!
//! Drop-in replacements for axum's `Json`, `Path` and `Query` on the input
//! side. A malformed body, path segment or query string comes back as a 400
//! with the usual `{"error": {...}}` body instead of axum's plain-text reply.

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::AppError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);
