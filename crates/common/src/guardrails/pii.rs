//! PII redaction
//!
//! Each category owns a pattern; matches are replaced with a
//! `[REDACTED_<CATEGORY>]` placeholder. Placeholders never match any
//! pattern, which makes redaction idempotent.

use super::{GuardrailStage, Verdict};
use crate::errors::{AppError, Result};
use crate::models::{AnswerEnvelope, Conversation};
use async_trait::async_trait;
use regex_lite::{Captures, Regex};
use std::str::FromStr;

/// Supported PII categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiiCategory {
    Email,
    Ip,
    CreditCard,
    MacAddress,
    Url,
}

impl PiiCategory {
    fn pattern(&self) -> &'static str {
        match self {
            PiiCategory::Email => r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}",
            PiiCategory::Ip => {
                r"\b(?:(?:25[0-5]|2[0-4][0-9]|1[0-9][0-9]|[1-9]?[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|1[0-9][0-9]|[1-9]?[0-9])\b"
            }
            PiiCategory::CreditCard => r"\b(?:[0-9][ -]?){12,18}[0-9]\b",
            PiiCategory::MacAddress => r"\b[0-9A-Fa-f]{2}(?:[:-][0-9A-Fa-f]{2}){5}\b",
            PiiCategory::Url => r#"https?://[^\s<>"']+"#,
        }
    }

    pub fn placeholder(&self) -> &'static str {
        match self {
            PiiCategory::Email => "[REDACTED_EMAIL]",
            PiiCategory::Ip => "[REDACTED_IP]",
            PiiCategory::CreditCard => "[REDACTED_CREDIT_CARD]",
            PiiCategory::MacAddress => "[REDACTED_MAC_ADDRESS]",
            PiiCategory::Url => "[REDACTED_URL]",
        }
    }
}

impl FromStr for PiiCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "email" => Ok(PiiCategory::Email),
            "ip" => Ok(PiiCategory::Ip),
            "credit_card" => Ok(PiiCategory::CreditCard),
            "mac_address" => Ok(PiiCategory::MacAddress),
            "url" => Ok(PiiCategory::Url),
            other => Err(AppError::Configuration {
                message: format!("Unknown PII category: {}", other),
            }),
        }
    }
}

/// Luhn checksum over the digits of a candidate card number
fn passes_luhn(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}

/// Redact every card number inside a digit run.
///
/// A greedy match can pull a neighbouring digit group in front of a card,
/// so the Luhn check runs over every span of whole digit groups, longest
/// first from each group.
fn redact_cards(candidate: &str, placeholder: &str) -> String {
    let groups: Vec<(usize, usize)> = candidate
        .char_indices()
        .fold(Vec::new(), |mut groups: Vec<(usize, usize)>, (i, c)| {
            if c.is_ascii_digit() {
                match groups.last_mut() {
                    Some(last) if last.1 == i => last.1 = i + 1,
                    _ => groups.push((i, i + 1)),
                }
            }
            groups
        });

    let mut redacted = String::with_capacity(candidate.len());
    let mut copied = 0;
    let mut first = 0;

    while first < groups.len() {
        let card_end = (first..groups.len()).rev().find(|&last| {
            let digits: String = groups[first..=last]
                .iter()
                .map(|&(start, end)| &candidate[start..end])
                .collect();
            passes_luhn(&digits)
        });

        match card_end {
            Some(last) => {
                redacted.push_str(&candidate[copied..groups[first].0]);
                redacted.push_str(placeholder);
                copied = groups[last].1;
                first = last + 1;
            }
            None => first += 1,
        }
    }

    redacted.push_str(&candidate[copied..]);
    redacted
}

#[derive(Debug)]
struct Redactor {
    category: PiiCategory,
    regex: Regex,
}

impl Redactor {
    fn redact(&self, text: &str) -> String {
        match self.category {
            PiiCategory::CreditCard => self
                .regex
                .replace_all(text, |caps: &Captures| {
                    redact_cards(&caps[0], self.category.placeholder())
                })
                .into_owned(),
            _ => self
                .regex
                .replace_all(text, self.category.placeholder())
                .into_owned(),
        }
    }
}

/// Redacts configured PII categories from the question and the answer.
/// Never terminates.
#[derive(Debug)]
pub struct PiiRedactionStage {
    redactors: Vec<Redactor>,
}

impl PiiRedactionStage {
    pub fn new(categories: &[PiiCategory]) -> Result<Self> {
        let redactors = categories
            .iter()
            .map(|&category| {
                Regex::new(category.pattern())
                    .map(|regex| Redactor { category, regex })
                    .map_err(|e| AppError::Configuration {
                        message: format!("Invalid PII pattern for {:?}: {}", category, e),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { redactors })
    }

    /// Build from configured category names
    pub fn from_names(names: &[String]) -> Result<Self> {
        let categories = names
            .iter()
            .map(|name| name.parse())
            .collect::<Result<Vec<PiiCategory>>>()?;
        Self::new(&categories)
    }

    /// Apply every category in order
    pub fn redact(&self, text: &str) -> String {
        self.redactors
            .iter()
            .fold(text.to_string(), |acc, redactor| redactor.redact(&acc))
    }
}

#[async_trait]
impl GuardrailStage for PiiRedactionStage {
    fn name(&self) -> &'static str {
        "pii_redaction"
    }

    async fn before_core(&self, conversation: &mut Conversation) -> Verdict {
        if let Some(message) = conversation.first_user_message_mut() {
            message.content = self.redact(&message.content);
        }
        Verdict::Continue
    }

    async fn after_core(&self, _conversation: &Conversation, answer: &mut AnswerEnvelope) -> Verdict {
        answer.answer.map_text(|text| self.redact(text));
        for source in answer.sources.iter_mut() {
            *source = self.redact(source);
        }
        Verdict::Continue
    }
}
