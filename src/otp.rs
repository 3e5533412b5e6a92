use chrono::{DateTime, Utc};
use rand::Rng;

#[derive(Debug, PartialEq, Eq)]
pub enum OtpError {
    Expired,
    Mismatch,
}

/// 6-digit zero-padded code, uniform over 000000..=999999.
pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..=999_999);
    format!("{:06}", n)
}

/// Expiry wins over a matching code: a correct code submitted after
/// `expires_at` still fails with `Expired`. On success the caller must
/// clear the stored code so it cannot be replayed.
pub fn validate_code(
    submitted: &str,
    stored: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), OtpError> {
    if now > expires_at {
        return Err(OtpError::Expired);
    }
    if submitted != stored {
        return Err(OtpError::Mismatch);
    }
    Ok(())
}
