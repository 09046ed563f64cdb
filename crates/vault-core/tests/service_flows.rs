//! End-to-end service tests over in-memory storage
//!
//! 1. **Registration**: a registered entity can be resolved by token, device id
//!    and phone number
//! 2. **Token storage**: store, overwrite, fetch, update and delete follow the
//!    status contract
//! 3. **Payloads**: a mirrored client ratchet exchanges payloads with the
//!    service in both directions
//! 4. **Atomicity**: a rejected payload leaves the stored session unchanged

use base64::{Engine, engine::general_purpose::STANDARD};
use vault_core::{
    Code, EntityId, EntityStore, Environment, MemoryStorage, SeededEnv, Status, TokenStore, VaultConfig,
    VaultKeys, VaultService,
    service::{
        DecryptPayloadRequest, DeleteEntityTokenRequest, EncryptPayloadRequest,
        GetEntityAccessTokenRequest, RegisterEntityRequest, RegisteredEntity, SESSION_MESSAGE,
        StoreEntityTokenRequest, UpdateEntityTokenRequest,
    },
};
use vault_crypto::{
    Header, Keypair, RatchetEntropy, RatchetState, decode_envelope, encode_envelope,
};

const PHONE: &str = "+237650000001";

struct Client {
    state: RatchetState,
    server_publish: [u8; 32],
    counter: u64,
}

impl Client {
    fn new(publish: &Keypair, registered: &RegisteredEntity) -> Self {
        let server_publish: [u8; 32] =
            STANDARD.decode(&registered.server_publish_pub_key).unwrap().try_into().unwrap();
        let shared = publish.agree(&server_publish).unwrap();
        Self { state: RatchetState::new(&shared, publish, server_publish), server_publish, counter: 0 }
    }

    fn entropy(&mut self) -> RatchetEntropy {
        self.counter += 1;
        let bytes = self.counter.to_le_bytes();
        RatchetEntropy {
            dh_secret: std::array::from_fn(|i| bytes[i % bytes.len()]),
            nonce: std::array::from_fn(|i| bytes[i % bytes.len()]),
        }
    }

    fn open(&mut self, envelope: &str) -> Vec<u8> {
        let envelope = decode_envelope(envelope).unwrap();
        let header = Header::from_bytes(&envelope.header).unwrap();
        let entropy = self.entropy();
        let ad = self.server_publish;
        self.state.decrypt(&header, &envelope.ciphertext, &ad, &entropy).unwrap()
    }

    fn seal(&mut self, plaintext: &[u8]) -> String {
        let entropy = self.entropy();
        let ad = self.server_publish;
        let (header, sealed) = self.state.encrypt(plaintext, &ad, &entropy).unwrap();
        encode_envelope(&header.to_bytes(), &sealed)
    }
}

struct Harness {
    env: SeededEnv,
    store: MemoryStorage,
    service: VaultService<SeededEnv, MemoryStorage>,
}

impl Harness {
    fn new() -> Self {
        let env = SeededEnv::new(42, 1_700_000_000);
        let store = MemoryStorage::new();
        let keys = VaultKeys::from_bytes(&[0x11; 32], &[0x22; 32]).unwrap();
        let service = VaultService::new(VaultConfig::new(keys), store.clone(), env.clone()).unwrap();
        Self { env, store, service }
    }

    fn register(&self, phone: &str) -> (RegisteredEntity, Keypair) {
        let publish = Keypair::from_secret(self.env.random_array());
        let device = Keypair::from_secret(self.env.random_array());
        let registered = self
            .service
            .register_entity(&RegisterEntityRequest {
                phone_number: phone.to_string(),
                country_code: "CM".to_string(),
                client_publish_pub_key: STANDARD.encode(publish.public_key()),
                client_device_id_pub_key: STANDARD.encode(device.public_key()),
            })
            .unwrap();
        (registered, publish)
    }

    fn store_token(&self, llt: &str, platform: &str, account: &str, token: &str) -> Result<String, Status> {
        self.service.store_entity_token(&StoreEntityTokenRequest {
            long_lived_token: llt.to_string(),
            token: token.to_string(),
            platform: platform.to_string(),
            account_identifier: account.to_string(),
        })
    }

    fn fetch_by_device(&self, device_id: &str, platform: &str, account: &str) -> Result<String, Status> {
        self.service.get_entity_access_token(&GetEntityAccessTokenRequest {
            device_id: device_id.to_string(),
            platform: platform.to_string(),
            account_identifier: account.to_string(),
            ..Default::default()
        })
    }
}

#[test]
fn registration_produces_working_identifiers() {
    let harness = Harness::new();
    let (registered, _) = harness.register(PHONE);

    assert_eq!(registered.device_id.len(), 64);
    assert!(registered.long_lived_token.starts_with(&format!("{}:", registered.entity_id)));

    let (claims, entity) = harness.service.authority().verify(&registered.long_lived_token).unwrap();
    assert_eq!(claims.eid, registered.entity_id);
    assert_eq!(entity.device_id.as_deref(), Some(registered.device_id.as_str()));
    assert_ne!(entity.country_code, "CM");
    assert_eq!(harness.service.blind_index().decrypt_and_decode(&entity.country_code).unwrap().as_str(), "CM");
}

#[test]
fn duplicate_phone_number_is_rejected() {
    let harness = Harness::new();
    harness.register(PHONE);

    let publish = Keypair::from_secret([9u8; 32]);
    let status = harness
        .service
        .register_entity(&RegisterEntityRequest {
            phone_number: PHONE.to_string(),
            country_code: "CM".to_string(),
            client_publish_pub_key: STANDARD.encode(publish.public_key()),
            client_device_id_pub_key: STANDARD.encode(publish.public_key()),
        })
        .unwrap_err();
    assert_eq!(status.code, Code::AlreadyExists);
}

#[test]
fn malformed_client_key_is_invalid_argument() {
    let harness = Harness::new();
    let status = harness
        .service
        .register_entity(&RegisterEntityRequest {
            phone_number: PHONE.to_string(),
            country_code: "CM".to_string(),
            client_publish_pub_key: STANDARD.encode([1u8; 16]),
            client_device_id_pub_key: STANDARD.encode([1u8; 32]),
        })
        .unwrap_err();
    assert_eq!(status.code, Code::InvalidArgument);
}

#[test]
fn token_lifecycle() {
    let harness = Harness::new();
    let (registered, _) = harness.register(PHONE);
    let llt = &registered.long_lived_token;

    harness.store_token(llt, "Gmail", "alice@example.com", "oauth-1").unwrap();
    assert_eq!(harness.fetch_by_device(&registered.device_id, "gmail", "alice@example.com").unwrap(), "oauth-1");

    let status = harness.store_token(llt, "gmail", "alice@example.com", "oauth-2").unwrap_err();
    assert_eq!(status.code, Code::AlreadyExists);
    assert!(status.message.contains("alice@example.com"));
    assert_eq!(harness.fetch_by_device(&registered.device_id, "GMAIL", "alice@example.com").unwrap(), "oauth-2");

    harness
        .service
        .update_entity_token(&UpdateEntityTokenRequest {
            phone_number: PHONE.to_string(),
            token: "oauth-3".to_string(),
            platform: "gmail".to_string(),
            account_identifier: "alice@example.com".to_string(),
            ..Default::default()
        })
        .unwrap();
    let by_token = harness
        .service
        .get_entity_access_token(&GetEntityAccessTokenRequest {
            long_lived_token: llt.clone(),
            platform: "gmail".to_string(),
            account_identifier: "alice@example.com".to_string(),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_token, "oauth-3");

    harness
        .service
        .delete_entity_token(&DeleteEntityTokenRequest {
            long_lived_token: llt.clone(),
            platform: "gmail".to_string(),
            account_identifier: "alice@example.com".to_string(),
        })
        .unwrap();
    let status = harness.fetch_by_device(&registered.device_id, "gmail", "alice@example.com").unwrap_err();
    assert_eq!(status.code, Code::NotFound);
}

#[test]
fn account_identifier_newlines_are_ignored() {
    let harness = Harness::new();
    let (registered, _) = harness.register(PHONE);

    harness.store_token(&registered.long_lived_token, "twitter", "@alice\n", "secret").unwrap();
    assert_eq!(harness.fetch_by_device(&registered.device_id, "twitter", "@alice").unwrap(), "secret");
}

#[test]
fn account_identifier_is_stored_as_given() {
    let harness = Harness::new();
    let (registered, _) = harness.register(PHONE);

    harness.store_token(&registered.long_lived_token, "twitter", "@alice\n", "secret").unwrap();

    let entity_id: EntityId = registered.entity_id.parse().unwrap();
    let tokens = harness.store.list_tokens(&entity_id).unwrap();
    assert_eq!(tokens.len(), 1);
    let stored = harness.service.blind_index().decrypt_and_decode(&tokens[0].account_identifier).unwrap();
    assert_eq!(stored.as_str(), "@alice\n");
}

#[test]
fn unsupported_platform_is_unimplemented() {
    let harness = Harness::new();
    let (registered, _) = harness.register(PHONE);

    let status = harness.store_token(&registered.long_lived_token, "myspace", "tom", "x").unwrap_err();
    assert_eq!(status.code, Code::Unimplemented);
    assert!(status.message.contains("'myspace'"));
}

#[test]
fn update_skips_platform_check_but_needs_existing_token() {
    let harness = Harness::new();
    let (registered, _) = harness.register(PHONE);

    let status = harness
        .service
        .update_entity_token(&UpdateEntityTokenRequest {
            device_id: registered.device_id.clone(),
            token: "x".to_string(),
            platform: "myspace".to_string(),
            account_identifier: "tom".to_string(),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(status.code, Code::NotFound);
}

#[test]
fn bad_long_lived_tokens_are_unauthenticated() {
    let harness = Harness::new();
    let (first, _) = harness.register(PHONE);
    let (second, _) = harness.register("+237650000002");

    let (_, second_body) = second.long_lived_token.split_once(':').unwrap();
    for token in ["no-separator".to_string(), format!("{}:{second_body}", first.entity_id)] {
        let status = harness.store_token(&token, "gmail", "a", "b").unwrap_err();
        assert_eq!(status.code, Code::Unauthenticated);
        assert_eq!(status.message, SESSION_MESSAGE);
    }
}

#[test]
fn expired_long_lived_token_is_unauthenticated() {
    let harness = Harness::new();
    let (registered, _) = harness.register(PHONE);

    harness.env.advance_clock(vault_core::config::DEFAULT_TOKEN_TTL_SECS);
    let status = harness.store_token(&registered.long_lived_token, "gmail", "a", "b").unwrap_err();
    assert_eq!(status.code, Code::Unauthenticated);
}

#[test]
fn unknown_device_is_unauthenticated() {
    let harness = Harness::new();
    let status = harness.fetch_by_device("0000", "gmail", "a").unwrap_err();
    assert_eq!(status.code, Code::Unauthenticated);
}

#[test]
fn missing_fields_are_invalid_argument() {
    let harness = Harness::new();
    let status = harness.service.encrypt_payload(&EncryptPayloadRequest::default()).unwrap_err();
    assert_eq!(status.code, Code::InvalidArgument);
    assert_eq!(status.message, "Missing required field: device_id");
}

#[test]
fn fresh_entity_payload_reaches_client() {
    let harness = Harness::new();
    let (registered, publish) = harness.register(PHONE);
    let mut client = Client::new(&publish, &registered);

    let envelope = harness
        .service
        .encrypt_payload(&EncryptPayloadRequest {
            device_id: registered.device_id.clone(),
            payload_plaintext: "hello".to_string(),
        })
        .unwrap();
    assert_eq!(client.open(&envelope), b"hello");

    let reply = client.seal(b"hi back");
    let plaintext = harness
        .service
        .decrypt_payload(&DecryptPayloadRequest {
            phone_number: PHONE.to_string(),
            payload_ciphertext: reply,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(plaintext, b"hi back");
}

#[test]
fn client_may_speak_first() {
    let harness = Harness::new();
    let (registered, publish) = harness.register(PHONE);
    let mut client = Client::new(&publish, &registered);

    for text in ["one", "two", "three"] {
        let plaintext = harness
            .service
            .decrypt_payload(&DecryptPayloadRequest {
                device_id: registered.device_id.clone(),
                payload_ciphertext: client.seal(text.as_bytes()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(plaintext, text.as_bytes());
    }
}

#[test]
fn skipped_message_decrypts_later() {
    let harness = Harness::new();
    let (registered, publish) = harness.register(PHONE);
    let mut client = Client::new(&publish, &registered);

    let first = client.seal(b"first");
    let second = client.seal(b"second");

    let decrypt = |payload: String| {
        harness.service.decrypt_payload(&DecryptPayloadRequest {
            device_id: registered.device_id.clone(),
            payload_ciphertext: payload,
            ..Default::default()
        })
    };
    assert_eq!(decrypt(second).unwrap(), b"second");
    assert_eq!(decrypt(first).unwrap(), b"first");
}

#[test]
fn identical_plaintexts_produce_distinct_envelopes() {
    let harness = Harness::new();
    let (registered, publish) = harness.register(PHONE);
    let mut client = Client::new(&publish, &registered);

    let request =
        EncryptPayloadRequest { device_id: registered.device_id.clone(), payload_plaintext: "same".to_string() };
    let envelopes: Vec<String> = (0..4).map(|_| harness.service.encrypt_payload(&request).unwrap()).collect();

    for (i, a) in envelopes.iter().enumerate() {
        for b in &envelopes[i + 1..] {
            assert_ne!(a, b);
        }
    }
    for envelope in &envelopes {
        assert_eq!(client.open(envelope), b"same");
    }
}

#[test]
fn rejected_payload_leaves_session_untouched() {
    let harness = Harness::new();
    let (registered, publish) = harness.register(PHONE);
    let mut client = Client::new(&publish, &registered);

    let good = client.seal(b"good");
    let entity_id: EntityId = registered.entity_id.parse().unwrap();
    let request = |payload: String| DecryptPayloadRequest {
        device_id: registered.device_id.clone(),
        payload_ciphertext: payload,
        ..Default::default()
    };

    harness.service.decrypt_payload(&request(client.seal(b"prime"))).unwrap();
    let before = harness.store.find_entity(&entity_id).unwrap().unwrap();

    let mut tampered = decode_envelope(&good).unwrap();
    let last = tampered.ciphertext.len() - 1;
    tampered.ciphertext[last] ^= 0x01;
    let status = harness
        .service
        .decrypt_payload(&request(encode_envelope(&tampered.header, &tampered.ciphertext)))
        .unwrap_err();
    assert_eq!(status.code, Code::InvalidArgument);

    let status = harness.service.decrypt_payload(&request("AAAA".to_string())).unwrap_err();
    assert_eq!(status.code, Code::InvalidArgument);

    let after = harness.store.find_entity(&entity_id).unwrap().unwrap();
    assert_eq!(before, after);

    assert_eq!(harness.service.decrypt_payload(&request(good)).unwrap(), b"good");
}
