//! PIX key validation and canonicalization. A key can be a CPF (personal tax
//! id), a CNPJ (company tax id), a Brazilian phone number, an email address
//! or an opaque random key (UUID). Variants are tried in that order and the
//! first match supplies the canonical form sent to the settlement gateway.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid pix key")]
pub struct InvalidKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Cpf,
    Cnpj,
    Phone,
    Email,
    RandomKey,
}

/// A validated PIX key in its canonical form: tax ids as bare digits, phone
/// numbers as E.164, emails and random keys as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixKey {
    kind: Kind,
    formatted: String,
}

impl PixKey {
    pub fn validate(raw: &str) -> Result<Self, InvalidKey> {
        let raw = raw.trim();
        if let Some(formatted) = validate_cpf(raw) {
            return Ok(Self {
                kind: Kind::Cpf,
                formatted,
            });
        }
        if let Some(formatted) = validate_cnpj(raw) {
            return Ok(Self {
                kind: Kind::Cnpj,
                formatted,
            });
        }
        if let Some(formatted) = validate_phone(raw) {
            return Ok(Self {
                kind: Kind::Phone,
                formatted,
            });
        }
        if validate_email(raw) {
            return Ok(Self {
                kind: Kind::Email,
                formatted: raw.to_owned(),
            });
        }
        if let Ok(uuid) = Uuid::parse_str(raw) {
            return Ok(Self {
                kind: Kind::RandomKey,
                formatted: uuid.to_string(),
            });
        }
        Err(InvalidKey)
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.formatted
    }

    pub fn into_string(self) -> String {
        self.formatted
    }
}

fn digits_of(raw: &str) -> Option<Vec<u32>> {
    let mut digits = Vec::new();
    for c in raw.chars() {
        match c {
            '0'..='9' => digits.push(c.to_digit(10).unwrap()),
            '.' | '-' | '/' | ' ' => continue,
            _ => return None,
        }
    }
    Some(digits)
}

/// CPF: 9 digits plus 2 check digits. Repdigit sequences like 111.111.111-11
/// pass the checksum but are not issued, so they are rejected.
fn validate_cpf(raw: &str) -> Option<String> {
    let digits = digits_of(raw)?;
    if digits.len() != 11 || digits.iter().all(|&d| d == digits[0]) {
        return None;
    }
    for check in [9, 10] {
        let sum: u32 = digits[..check]
            .iter()
            .zip((2..=check as u32 + 1).rev())
            .map(|(&d, weight)| d * weight)
            .sum();
        if sum * 10 % 11 % 10 != digits[check] {
            return None;
        }
    }
    Some(digits.iter().map(|d| d.to_string()).collect())
}

/// CNPJ: 12 digits plus 2 check digits, weights cycling 2..=9 from the right.
fn validate_cnpj(raw: &str) -> Option<String> {
    let digits = digits_of(raw)?;
    if digits.len() != 14 || digits.iter().all(|&d| d == digits[0]) {
        return None;
    }
    for check in [12, 13] {
        let sum: u32 = digits[..check]
            .iter()
            .rev()
            .zip((2..=9).cycle())
            .map(|(&d, weight)| d * weight)
            .sum();
        let expected = match sum % 11 {
            0 | 1 => 0,
            rem => 11 - rem,
        };
        if expected != digits[check] {
            return None;
        }
    }
    Some(digits.iter().map(|d| d.to_string()).collect())
}

/// Phone keys canonicalize to E.164. Without an international prefix the
/// number is taken as Brazilian: a two-digit area code followed by a
/// nine-digit mobile (leading 9) or an eight-digit landline number.
fn validate_phone(raw: &str) -> Option<String> {
    let has_prefix = raw.starts_with('+');
    let rest = if has_prefix { &raw[1..] } else { raw };
    let mut digits = String::new();
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            '(' | ')' | '-' | ' ' => continue,
            _ => return None,
        }
    }
    if has_prefix {
        if (8..=15).contains(&digits.len()) && !digits.starts_with('0') {
            return Some(format!("+{}", digits));
        }
        return None;
    }
    let bytes = digits.as_bytes();
    let valid = match digits.len() {
        11 => bytes[0] != b'0' && bytes[2] == b'9',
        10 => bytes[0] != b'0',
        _ => false,
    };
    valid.then(|| format!("+55{}", digits))
}

fn validate_email(raw: &str) -> bool {
    let (local, domain) = match raw.split_once('@') {
        Some(parts) => parts,
        None => return false,
    };
    if local.is_empty() || local.len() > 64 || domain.len() < 3 {
        return false;
    }
    if raw.chars().any(char::is_whitespace) || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && tld.len() >= 2,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_formatted_cpf() {
        let key = PixKey::validate("529.982.247-25").unwrap();
        assert_eq!(key.kind(), Kind::Cpf);
        assert_eq!(key.as_str(), "52998224725");
    }

    #[test]
    fn rejects_cpfs_with_bad_check_digits() {
        assert_eq!(PixKey::validate("529.982.247-26"), Err(InvalidKey));
        assert_eq!(PixKey::validate("111.111.111-11"), Err(InvalidKey));
    }

    #[test]
    fn accepts_a_formatted_cnpj() {
        let key = PixKey::validate("11.222.333/0001-81").unwrap();
        assert_eq!(key.kind(), Kind::Cnpj);
        assert_eq!(key.as_str(), "11222333000181");
    }

    #[test]
    fn accepts_national_phone_numbers_as_brazilian() {
        let key = PixKey::validate("(11) 98765-4321").unwrap();
        assert_eq!(key.kind(), Kind::Phone);
        assert_eq!(key.as_str(), "+5511987654321");
    }

    #[test]
    fn keeps_an_international_prefix() {
        let key = PixKey::validate("+55 11 98765-4321").unwrap();
        assert_eq!(key.kind(), Kind::Phone);
        assert_eq!(key.as_str(), "+5511987654321");
    }

    #[test]
    fn accepts_emails_verbatim() {
        let key = PixKey::validate("payee@example.com").unwrap();
        assert_eq!(key.kind(), Kind::Email);
        assert_eq!(key.as_str(), "payee@example.com");
    }

    #[test]
    fn canonicalizes_random_keys() {
        let key = PixKey::validate("123E4567-E89B-12D3-A456-426614174000").unwrap();
        assert_eq!(key.kind(), Kind::RandomKey);
        assert_eq!(key.as_str(), "123e4567-e89b-12d3-a456-426614174000");
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(PixKey::validate("not-a-key"), Err(InvalidKey));
        assert_eq!(PixKey::validate(""), Err(InvalidKey));
        assert_eq!(PixKey::validate("123"), Err(InvalidKey));
    }
}
