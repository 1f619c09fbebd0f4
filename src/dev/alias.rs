use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use super::entity::Account;
use super::ledger::Ledger;
use crate::error::Error;
use crate::model::{AliasAddress, RequestAliasResult};

/// Suffix appended to every handle alias
pub const SEARCH_DOMAIN: &str = ".sarafu.local";
/// Appended to a handle until it no longer collides with another owner's alias
const DISAMBIGUATOR: char = 'x';

static ALIAS_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[a-zA-Z0-9\-_]+$").expect("alias hint pattern"));

// E.164: country code without leading zero, at most 15 digits overall
static PHONE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[1-9][0-9]{7,14}$").expect("phone number pattern"));

pub fn is_valid_alias_hint(hint: &str) -> bool {
    ALIAS_HINT.is_match(hint)
}

pub fn is_valid_phone_number(number: &str) -> bool {
    PHONE_NUMBER.is_match(number)
}

impl Ledger {
    pub(crate) fn request_alias(
        &mut self,
        public_key: &str,
        hint: &str,
    ) -> Result<RequestAliasResult, Error> {
        if !is_valid_alias_hint(hint) {
            tracing::error!(address = public_key, hint, "alias hint does not match");
            return Err(Error::invalid_input(format!("alias hint {hint:?}")));
        }
        if !self.accounts.contains_key(public_key) {
            // accounts created directly against the remote api
            let acc = Account::new(public_key, Uuid::new_v4().to_string());
            self.save_account(&acc)?;
            self.insert_account(acc);
        }

        if hint.starts_with('+') {
            return self.apply_phone_alias(public_key, hint);
        }

        let mut handle = hint.to_string();
        let alias = loop {
            let candidate = format!("{handle}{SEARCH_DOMAIN}");
            match self.aliases.get(&candidate) {
                Some(owner) if owner != public_key => handle.push(DISAMBIGUATOR),
                _ => break candidate,
            }
        };

        self.save_alias(&alias, public_key)?;
        if let Some(acc) = self.accounts.get(public_key) {
            let mut acc = acc.clone();
            acc.alias = Some(alias.clone());
            self.save_account(&acc)?;
            self.accounts.insert(public_key.to_string(), acc);
        }
        self.aliases.insert(alias.clone(), public_key.to_string());
        tracing::debug!(address = public_key, alias = %alias, "set alias");

        Ok(RequestAliasResult { alias })
    }

    /// Phone aliases are bound bare, without domain or disambiguation.
    fn apply_phone_alias(
        &mut self,
        public_key: &str,
        phone: &str,
    ) -> Result<RequestAliasResult, Error> {
        if !is_valid_phone_number(phone) {
            tracing::error!(address = public_key, phone, "invalid phone number alias");
            return Err(Error::invalid_input(format!("phone number {phone:?}")));
        }
        match self.aliases.get(phone) {
            Some(owner) if owner != public_key => {
                return Err(Error::already_exists(format!(
                    "phone alias {phone} bound to another account"
                )))
            }
            Some(_) => {}
            None => {
                self.save_alias(phone, public_key)?;
                self.aliases.insert(phone.to_string(), public_key.to_string());
            }
        }
        tracing::debug!(address = public_key, phone, "matched phone number alias");
        Ok(RequestAliasResult {
            alias: phone.to_string(),
        })
    }

    pub(crate) fn check_alias_address(&self, alias: &str) -> Result<AliasAddress, Error> {
        let Some(address) = self.aliases.get(alias) else {
            tracing::error!(alias, "alias check failed");
            return Err(Error::not_found(format!("alias {alias}")));
        };
        let Some(acc) = self.accounts.get(address) else {
            tracing::error!(alias, address = %address, "alias found but does not resolve");
            return Err(Error::not_found(format!(
                "alias {alias} found but does not resolve"
            )));
        };
        Ok(AliasAddress {
            address: acc.address.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_hint_pattern() {
        assert!(is_valid_alias_hint("foo"));
        assert!(is_valid_alias_hint("foo-bar_9"));
        assert!(is_valid_alias_hint("+254712345678"));
        assert!(!is_valid_alias_hint("foo.bar"));
        assert!(!is_valid_alias_hint("foo bar"));
        assert!(!is_valid_alias_hint(""));
        assert!(!is_valid_alias_hint("++1"));
    }

    #[test]
    fn test_phone_number_pattern() {
        assert!(is_valid_phone_number("+254712345678"));
        assert!(is_valid_phone_number("+14155552671"));
        assert!(!is_valid_phone_number("+254f00"));
        assert!(!is_valid_phone_number("+0712345678"));
        assert!(!is_valid_phone_number("+123"));
        assert!(!is_valid_phone_number("254712345678"));
    }
}
