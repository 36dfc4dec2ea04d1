//! Human-facing order and payment numbers: `PREFIX-yyyymmdd-xxxxxxxx`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

fn generate(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}-{}", now.format("%Y%m%d"), &suffix[..8])
}

#[must_use]
pub fn order_number(now: DateTime<Utc>) -> String {
    generate("ORD", now)
}

#[must_use]
pub fn payment_number(now: DateTime<Utc>) -> String {
    generate("PAY", now)
}
