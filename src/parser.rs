//! Card key text format: batch import parsing and display templates.
//!
//! The import format is a sequence of blocks separated by a line of sixteen
//! dashes. Each block holds `label：value` lines (full-width colon):
//!
//! ```text
//! 租户URL：https://tenant.example.com
//! 访问令牌(Token)：tok_abc
//! 邮箱：user@example.com
//! 余额查询URL：https://tenant.example.com/balance
//! 实际到期日：2025-01-01
//! 查询参数：q=1
//! ----------------
//! ```
//!
//! The balance URL line is optional. Blocks missing any other field are
//! dropped without an error; callers only see how many records survived.

use std::str::Split;

use crate::models::card_key::{CardKey, NewCardKey};

/// Line separating two blocks.
pub const BLOCK_DELIMITER: &str = "----------------";

const LABEL_TENANT_URL: &str = "租户URL：";
const LABEL_ACCESS_TOKEN: &str = "访问令牌(Token)：";
const LABEL_EMAIL: &str = "邮箱：";
const LABEL_BALANCE_URL: &str = "余额查询URL：";
const LABEL_EXPIRY_DATE: &str = "实际到期日：";
const LABEL_QUERY_PARAMS: &str = "查询参数：";

/// Iterator over the valid card key records of an import text, in input order.
pub struct CardKeyBlocks<'a> {
    blocks: Split<'a, &'static str>,
}

impl<'a> CardKeyBlocks<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            blocks: text.split(BLOCK_DELIMITER),
        }
    }
}

impl Iterator for CardKeyBlocks<'_> {
    type Item = NewCardKey;

    fn next(&mut self) -> Option<Self::Item> {
        self.blocks.by_ref().find_map(|block| {
            let block = block.trim();
            if block.is_empty() {
                return None;
            }
            parse_block(block)
        })
    }
}

/// Parse all valid records from an import text.
pub fn parse_card_keys_text(text: &str) -> Vec<NewCardKey> {
    CardKeyBlocks::new(text).collect()
}

#[derive(Default)]
struct PartialCardKey {
    tenant_url: Option<String>,
    access_token: Option<String>,
    email: Option<String>,
    balance_url: Option<String>,
    expiry_date: Option<String>,
    query_params: Option<String>,
}

fn parse_block(block: &str) -> Option<NewCardKey> {
    let mut partial = PartialCardKey::default();

    for line in block.lines().map(str::trim) {
        let (slot, value) = if let Some(v) = line.strip_prefix(LABEL_TENANT_URL) {
            (&mut partial.tenant_url, v)
        } else if let Some(v) = line.strip_prefix(LABEL_ACCESS_TOKEN) {
            (&mut partial.access_token, v)
        } else if let Some(v) = line.strip_prefix(LABEL_EMAIL) {
            (&mut partial.email, v)
        } else if let Some(v) = line.strip_prefix(LABEL_BALANCE_URL) {
            (&mut partial.balance_url, v)
        } else if let Some(v) = line.strip_prefix(LABEL_EXPIRY_DATE) {
            (&mut partial.expiry_date, v)
        } else if let Some(v) = line.strip_prefix(LABEL_QUERY_PARAMS) {
            (&mut partial.query_params, v)
        } else {
            continue;
        };

        // A blank value never clears one already seen in the block.
        let value = value.trim();
        if !value.is_empty() {
            *slot = Some(value.to_string());
        }
    }

    Some(NewCardKey {
        tenant_url: partial.tenant_url?,
        access_token: partial.access_token?,
        email: partial.email?,
        balance_url: partial.balance_url,
        expiry_date: partial.expiry_date?,
        query_params: partial.query_params?,
    })
}

/// Render a card key with the fixed template shown to the holder.
pub fn format_card_key_for_display(card: &CardKey) -> String {
    format!(
        "您的登录信息如下\n\
         {LABEL_TENANT_URL}{}\n\
         {LABEL_ACCESS_TOKEN}{}\n\
         {LABEL_EMAIL}{}\n\
         {LABEL_BALANCE_URL}{}\n\
         {LABEL_EXPIRY_DATE}{}",
        card.tenant_url,
        card.access_token,
        card.email,
        card.balance_url.as_deref().unwrap_or_default(),
        card.expiry_date,
    )
}

/// Public redemption link for a secure token.
pub fn redemption_link(base_url: &str, secure_token: &str) -> String {
    format!("{}/key/{}", base_url.trim_end_matches('/'), secure_token)
}

/// Numbered detail blocks for the unused keys in `cards`, for offline hand-out.
pub fn format_unused_details(cards: &[CardKey], base_url: &str) -> String {
    cards
        .iter()
        .filter(|card| !card.is_used)
        .enumerate()
        .map(|(index, card)| {
            format!(
                "=== 卡密 {} ===\n\
                 链接：{}\n\
                 {LABEL_TENANT_URL}{}\n\
                 访问令牌：{}\n\
                 {LABEL_EMAIL}{}\n\
                 {LABEL_BALANCE_URL}{}\n\
                 {LABEL_EXPIRY_DATE}{}\n\
                 创建时间：{}\n\
                 {BLOCK_DELIMITER}",
                index + 1,
                redemption_link(base_url, &card.secure_token),
                card.tenant_url,
                card.access_token,
                card.email,
                card.balance_url.as_deref().unwrap_or_default(),
                card.expiry_date,
                card.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
