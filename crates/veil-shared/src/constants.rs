/// Separator between an environment prefix and an identity, and between a
/// user and a host in a transport address.
pub const ADDRESS_SEPARATOR: char = '@';

/// Environment prefixes accepted in front of a login identifier.
pub const PROD_ENV_PREFIX: &str = "prod";
pub const STG_ENV_PREFIX: &str = "stg";
pub const DEV_ENV_PREFIX: &str = "dev";

/// Default transport (XMPP client-to-server) port
pub const DEFAULT_TRANSPORT_PORT: u16 = 5222;

/// Environment variable overrides
pub const ENV_IDENTITY_URL: &str = "VEIL_IDENTITY_URL";
pub const ENV_TRANSPORT_HOST: &str = "VEIL_TRANSPORT_HOST";
pub const ENV_TRANSPORT_PORT: &str = "VEIL_TRANSPORT_PORT";
pub const ENV_CA_BUNDLE: &str = "VEIL_CA_BUNDLE";

/// Size of the native credential structure: X25519 secret + Ed25519 seed.
pub const CREDENTIAL_BLOB_SIZE: usize = 64;

/// Version tag of the stored credential encoding
pub const CREDENTIAL_FORMAT_VERSION: u8 = 1;

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Envelope type tag for plain text messages
pub const ENVELOPE_TYPE_TEXT: &str = "text";

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_PAIR_KEY: &str = "veil-pair-key-v1";
pub const KDF_CONTEXT_TRANSPORT_PASSWORD: &str = "veil-transport-password-v1";
