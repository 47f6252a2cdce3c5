//! Masking for OTP delivery hints. Responses never echo a full phone number or email back to
//! the client; they only confirm where a code went.

/// Keep the dialling prefix and the last three digits: `+2348012345678` → `+234********678`.
pub fn mask_phone(phone: &str) -> String {
    let n = phone.chars().count();
    if n <= 7 {
        return "*".repeat(n);
    }
    let prefix: String = phone.chars().take(4).collect();
    let suffix: String = phone.chars().skip(n - 3).collect();
    format!("{prefix}{}{suffix}", "*".repeat(n - 7))
}

/// Keep the first character of the local part and the whole domain:
/// `adaeze@example.com` → `a*****@example.com`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first = local.chars().take(1).collect::<String>();
            format!("{first}{}@{domain}", "*".repeat(local.chars().count().saturating_sub(1)))
        },
        _ => "***".into(),
    }
}
