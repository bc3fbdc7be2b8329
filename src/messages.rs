//! Localized requester messages
//!
//! Renders notices in English, Russian or Ukrainian. Unknown locales fall
//! back to English.

use crate::effects::{Notice, Outcome};
use crate::validator::{Chain, CheckCode, TransferDetails};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    En,
    Ru,
    Ua,
}

impl Locale {
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "ru" => Locale::Ru,
            "ua" | "uk" => Locale::Ua,
            _ => Locale::En,
        }
    }
}

fn chain_label(chain: Chain) -> &'static str {
    match chain {
        Chain::Erc20 => "USDT (ERC-20)",
        Chain::Trc20 => "USDT (TRC-20)",
    }
}

/// Renders `notice` for a requester on `chain` in `locale`.
pub fn render(notice: &Notice, chain: Chain, locale: &str) -> String {
    let locale = Locale::parse(locale);
    match notice {
        Notice::InProgress => in_progress(locale),
        Notice::Final(Outcome::Confirmed { details }) => confirmed(locale, details),
        Notice::Final(Outcome::Rejected { code, error }) => rejected(locale, chain, *code, error),
        Notice::Final(Outcome::Expired { window, .. }) => expired(locale, *window),
    }
}

fn in_progress(locale: Locale) -> String {
    match locale {
        Locale::En => "🔍 Checking transaction...\n⏳ The transfer is not final yet. We will notify you once it is confirmed.",
        Locale::Ru => "🔍 Проверяю транзакцию...\n⏳ Перевод ещё не подтверждён. Мы сообщим, как только он будет подтверждён.",
        Locale::Ua => "🔍 Перевіряю транзакцію...\n⏳ Переказ ще не підтверджено. Ми повідомимо, щойно його буде підтверджено.",
    }
    .to_string()
}

fn confirmed(locale: Locale, details: &TransferDetails) -> String {
    let amount = details.amount.map(|a| a.to_string()).unwrap_or_else(|| "?".to_string());
    let from = details.counterparty.as_deref().unwrap_or("?");
    let time = details
        .timestamp
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "?".to_string());
    match locale {
        Locale::En => format!(
            "✅ Transaction confirmed!\n\n💰 Amount: {} USDT\n📤 From: {}\n🕐 Time: {}",
            amount, from, time
        ),
        Locale::Ru => format!(
            "✅ Транзакция подтверждена!\n\n💰 Сумма: {} USDT\n📤 Отправитель: {}\n🕐 Время: {}",
            amount, from, time
        ),
        Locale::Ua => format!(
            "✅ Транзакцію підтверджено!\n\n💰 Сума: {} USDT\n📤 Відправник: {}\n🕐 Час: {}",
            amount, from, time
        ),
    }
}

fn rejected(locale: Locale, chain: Chain, code: CheckCode, error: &str) -> String {
    let label = chain_label(chain);
    match (code, locale) {
        (CheckCode::InvalidToken, Locale::En) => format!("❌ The transaction does not transfer {}.", label),
        (CheckCode::InvalidToken, Locale::Ru) => format!("❌ Транзакция не является переводом {}.", label),
        (CheckCode::InvalidToken, Locale::Ua) => format!("❌ Транзакція не є переказом {}.", label),
        (CheckCode::InvalidRecipient, Locale::En) => {
            "❌ USDT sent to wrong address. The recipient differs from the address issued to you.".to_string()
        }
        (CheckCode::InvalidRecipient, Locale::Ru) => {
            "❌ USDT отправлены на другой адрес. Получатель не совпадает с выданным вам адресом.".to_string()
        }
        (CheckCode::InvalidRecipient, Locale::Ua) => {
            "❌ USDT надіслано на іншу адресу. Одержувач не збігається з виданою вам адресою.".to_string()
        }
        (CheckCode::NoTransfers, Locale::En) => format!(
            "❌ The transaction contains no {} transfers. It may be a TRX or other token transfer.",
            label
        ),
        (CheckCode::NoTransfers, Locale::Ru) => format!(
            "❌ Транзакция не содержит переводов {}. Возможно, это перевод TRX или другого токена.",
            label
        ),
        (CheckCode::NoTransfers, Locale::Ua) => format!(
            "❌ Транзакція не містить переказів {}. Можливо, це переказ TRX або іншого токена.",
            label
        ),
        (CheckCode::ContractError, Locale::En) => "❌ The token contract call failed on-chain.".to_string(),
        (CheckCode::ContractError, Locale::Ru) => "❌ Ошибка исполнения контракта токена.".to_string(),
        (CheckCode::ContractError, Locale::Ua) => "❌ Помилка виконання контракту токена.".to_string(),
        (_, Locale::En) => format!("❌ The transaction was rejected: {}", error),
        (_, Locale::Ru) => format!("❌ Транзакция отклонена: {}", error),
        (_, Locale::Ua) => format!("❌ Транзакцію відхилено: {}", error),
    }
}

fn expired(locale: Locale, window: Duration) -> String {
    let span = window_span(locale, window);
    match locale {
        Locale::En => format!(
            "⌛ The transaction was not confirmed within {} and is no longer tracked. Please contact support.",
            span
        ),
        Locale::Ru => format!(
            "⌛ Транзакция не была подтверждена в течение {} и больше не отслеживается. Обратитесь в поддержку.",
            span
        ),
        Locale::Ua => format!(
            "⌛ Транзакцію не було підтверджено протягом {} і більше не відстежується. Зверніться до підтримки.",
            span
        ),
    }
}

/// Whole hours when the window is a multiple of an hour, otherwise minutes rounded up.
fn window_span(locale: Locale, window: Duration) -> String {
    let secs = window.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        let hours = secs / 3600;
        return match locale {
            Locale::En if hours == 1 => "1 hour".to_string(),
            Locale::En => format!("{} hours", hours),
            Locale::Ru => format!("{} ч.", hours),
            Locale::Ua => format!("{} год.", hours),
        };
    }
    let minutes = secs.div_ceil(60).max(1);
    match locale {
        Locale::En if minutes == 1 => "1 minute".to_string(),
        Locale::En => format!("{} minutes", minutes),
        Locale::Ru => format!("{} мин.", minutes),
        Locale::Ua => format!("{} хв.", minutes),
    }
}
