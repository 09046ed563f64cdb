//! Request and response messages
//!
//! Text fields follow RPC conventions: an empty string is an absent field.
//! Each request lists its required fields as groups of alternatives; a group
//! is satisfied when any one of its fields is non-empty.

use super::status::Status;

/// Named request field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// `long_lived_token`
    LongLivedToken,
    /// `device_id`
    DeviceId,
    /// `phone_number`
    PhoneNumber,
    /// `token`
    Token,
    /// `platform`
    Platform,
    /// `account_identifier`
    AccountIdentifier,
    /// `payload_ciphertext`
    PayloadCiphertext,
    /// `payload_plaintext`
    PayloadPlaintext,
    /// `country_code`
    CountryCode,
    /// `client_publish_pub_key`
    ClientPublishPubKey,
    /// `client_device_id_pub_key`
    ClientDeviceIdPubKey,
}

impl Field {
    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::LongLivedToken => "long_lived_token",
            Self::DeviceId => "device_id",
            Self::PhoneNumber => "phone_number",
            Self::Token => "token",
            Self::Platform => "platform",
            Self::AccountIdentifier => "account_identifier",
            Self::PayloadCiphertext => "payload_ciphertext",
            Self::PayloadPlaintext => "payload_plaintext",
            Self::CountryCode => "country_code",
            Self::ClientPublishPubKey => "client_publish_pub_key",
            Self::ClientDeviceIdPubKey => "client_device_id_pub_key",
        }
    }
}

/// A request with declared field requirements.
pub trait Request {
    /// Required field groups, checked in order.
    const REQUIRED: &'static [&'static [Field]];

    /// Value of `field`, empty when absent or not part of this request.
    fn field(&self, field: Field) -> &str;

    /// Reject the request if any required group is unsatisfied.
    fn validate(&self) -> Result<(), Status> {
        for group in Self::REQUIRED {
            if group.iter().all(|field| self.field(*field).is_empty()) {
                let names: Vec<&str> = group.iter().map(|field| field.name()).collect();
                return Err(Status::invalid_argument(format!("Missing required field: {}", names.join(" or "))));
            }
        }
        Ok(())
    }
}

/// Store a platform token for the caller.
#[derive(Debug, Clone, Default)]
pub struct StoreEntityTokenRequest {
    /// Caller's long-lived token
    pub long_lived_token: String,
    /// Platform credentials to store
    pub token: String,
    /// Platform name
    pub platform: String,
    /// Account on the platform
    pub account_identifier: String,
}

impl Request for StoreEntityTokenRequest {
    const REQUIRED: &'static [&'static [Field]] =
        &[&[Field::LongLivedToken], &[Field::Token], &[Field::Platform], &[Field::AccountIdentifier]];

    fn field(&self, field: Field) -> &str {
        match field {
            Field::LongLivedToken => &self.long_lived_token,
            Field::Token => &self.token,
            Field::Platform => &self.platform,
            Field::AccountIdentifier => &self.account_identifier,
            _ => "",
        }
    }
}

/// Decrypt a payload sent by the entity's client.
#[derive(Debug, Clone, Default)]
pub struct DecryptPayloadRequest {
    /// Device identifier
    pub device_id: String,
    /// Phone number, used when no device id is given
    pub phone_number: String,
    /// Base64 envelope
    pub payload_ciphertext: String,
}

impl Request for DecryptPayloadRequest {
    const REQUIRED: &'static [&'static [Field]] =
        &[&[Field::DeviceId, Field::PhoneNumber], &[Field::PayloadCiphertext]];

    fn field(&self, field: Field) -> &str {
        match field {
            Field::DeviceId => &self.device_id,
            Field::PhoneNumber => &self.phone_number,
            Field::PayloadCiphertext => &self.payload_ciphertext,
            _ => "",
        }
    }
}

/// Encrypt a payload for the entity's client.
#[derive(Debug, Clone, Default)]
pub struct EncryptPayloadRequest {
    /// Device identifier
    pub device_id: String,
    /// Text to encrypt
    pub payload_plaintext: String,
}

impl Request for EncryptPayloadRequest {
    const REQUIRED: &'static [&'static [Field]] = &[&[Field::DeviceId], &[Field::PayloadPlaintext]];

    fn field(&self, field: Field) -> &str {
        match field {
            Field::DeviceId => &self.device_id,
            Field::PayloadPlaintext => &self.payload_plaintext,
            _ => "",
        }
    }
}

/// Fetch a stored platform token.
#[derive(Debug, Clone, Default)]
pub struct GetEntityAccessTokenRequest {
    /// Caller's long-lived token; preferred when present
    pub long_lived_token: String,
    /// Device identifier
    pub device_id: String,
    /// Phone number
    pub phone_number: String,
    /// Platform name
    pub platform: String,
    /// Account on the platform
    pub account_identifier: String,
}

impl Request for GetEntityAccessTokenRequest {
    const REQUIRED: &'static [&'static [Field]] = &[
        &[Field::DeviceId, Field::LongLivedToken, Field::PhoneNumber],
        &[Field::Platform],
        &[Field::AccountIdentifier],
    ];

    fn field(&self, field: Field) -> &str {
        match field {
            Field::LongLivedToken => &self.long_lived_token,
            Field::DeviceId => &self.device_id,
            Field::PhoneNumber => &self.phone_number,
            Field::Platform => &self.platform,
            Field::AccountIdentifier => &self.account_identifier,
            _ => "",
        }
    }
}

/// Replace a stored platform token.
#[derive(Debug, Clone, Default)]
pub struct UpdateEntityTokenRequest {
    /// Device identifier
    pub device_id: String,
    /// Phone number, used when no device id is given
    pub phone_number: String,
    /// New platform credentials
    pub token: String,
    /// Platform name
    pub platform: String,
    /// Account on the platform
    pub account_identifier: String,
}

impl Request for UpdateEntityTokenRequest {
    const REQUIRED: &'static [&'static [Field]] = &[
        &[Field::DeviceId, Field::PhoneNumber],
        &[Field::Token],
        &[Field::Platform],
        &[Field::AccountIdentifier],
    ];

    fn field(&self, field: Field) -> &str {
        match field {
            Field::DeviceId => &self.device_id,
            Field::PhoneNumber => &self.phone_number,
            Field::Token => &self.token,
            Field::Platform => &self.platform,
            Field::AccountIdentifier => &self.account_identifier,
            _ => "",
        }
    }
}

/// Delete a stored platform token.
#[derive(Debug, Clone, Default)]
pub struct DeleteEntityTokenRequest {
    /// Caller's long-lived token
    pub long_lived_token: String,
    /// Platform name
    pub platform: String,
    /// Account on the platform
    pub account_identifier: String,
}

impl Request for DeleteEntityTokenRequest {
    const REQUIRED: &'static [&'static [Field]] =
        &[&[Field::LongLivedToken], &[Field::Platform], &[Field::AccountIdentifier]];

    fn field(&self, field: Field) -> &str {
        match field {
            Field::LongLivedToken => &self.long_lived_token,
            Field::Platform => &self.platform,
            Field::AccountIdentifier => &self.account_identifier,
            _ => "",
        }
    }
}

/// Provision an entity from its client's public keys.
#[derive(Debug, Clone, Default)]
pub struct RegisterEntityRequest {
    /// Phone number in international format
    pub phone_number: String,
    /// Country code
    pub country_code: String,
    /// Client publish public key, base64
    pub client_publish_pub_key: String,
    /// Client device-id public key, base64
    pub client_device_id_pub_key: String,
}

impl Request for RegisterEntityRequest {
    const REQUIRED: &'static [&'static [Field]] = &[
        &[Field::PhoneNumber],
        &[Field::CountryCode],
        &[Field::ClientPublishPubKey],
        &[Field::ClientDeviceIdPubKey],
    ];

    fn field(&self, field: Field) -> &str {
        match field {
            Field::PhoneNumber => &self.phone_number,
            Field::CountryCode => &self.country_code,
            Field::ClientPublishPubKey => &self.client_publish_pub_key,
            Field::ClientDeviceIdPubKey => &self.client_device_id_pub_key,
            _ => "",
        }
    }
}

/// Result of [`super::VaultService::register_entity`].
#[derive(Debug, Clone)]
pub struct RegisteredEntity {
    /// New entity id
    pub entity_id: String,
    /// Derived device identifier
    pub device_id: String,
    /// Long-lived token for the device
    pub long_lived_token: String,
    /// Server publish public key, base64
    pub server_publish_pub_key: String,
    /// Server device-id public key, base64
    pub server_device_id_pub_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::status::Code;

    #[test]
    fn alternatives_are_joined_with_or() {
        let request = DecryptPayloadRequest { payload_ciphertext: "blob".to_string(), ..Default::default() };
        let status = request.validate().unwrap_err();
        assert_eq!(status.code, Code::InvalidArgument);
        assert_eq!(status.message, "Missing required field: device_id or phone_number");
    }

    #[test]
    fn any_alternative_satisfies_group() {
        let request = DecryptPayloadRequest {
            phone_number: "+15550100".to_string(),
            payload_ciphertext: "blob".to_string(),
            ..Default::default()
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn groups_are_checked_in_order() {
        let request = StoreEntityTokenRequest { platform: "gmail".to_string(), ..Default::default() };
        assert_eq!(request.validate().unwrap_err().message, "Missing required field: long_lived_token");
    }
}
