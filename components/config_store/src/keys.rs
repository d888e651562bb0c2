//! Configuration keys, layers and value variants
//!
//! The key enum is partitioned into contiguous ranges per primitive type so
//! the store can keep cells in one flat array indexed by discriminant.

use std::fmt;

/// Provenance tag of a configuration value
///
/// Layers are totally ordered; a write is accepted only when the writer's
/// layer is `>=` the current owner of the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigLayer {
    /// Compiled-in default
    Default = 0,
    /// Operator provisioning (config files)
    Operator = 1,
    /// Values derived from the stream/manifest
    Stream = 2,
    /// Embedding application API
    Application = 3,
    /// Per-tune override
    Tune = 4,
    /// Developer override, highest priority
    Dev = 5,
}

impl ConfigLayer {
    /// Short name used in diagnostics and config dumps
    pub fn short_name(&self) -> &'static str {
        match self {
            ConfigLayer::Default => "def",
            ConfigLayer::Operator => "oper",
            ConfigLayer::Stream => "stream",
            ConfigLayer::Application => "app",
            ConfigLayer::Tune => "tune",
            ConfigLayer::Dev => "dev",
        }
    }
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Primitive type a configuration key stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Boolean flag
    Bool,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// Floating point
    Double,
    /// UTF-8 string
    String,
}

/// A typed configuration value
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// Boolean flag
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// Floating point
    Double(f64),
    /// UTF-8 string
    String(String),
}

impl ConfigValue {
    /// The primitive kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigValue::Bool(_) => ValueKind::Bool,
            ConfigValue::Int(_) => ValueKind::Int,
            ConfigValue::Long(_) => ValueKind::Long,
            ConfigValue::Double(_) => ValueKind::Double,
            ConfigValue::String(_) => ValueKind::String,
        }
    }
}

/// Fixed configuration key set
///
/// Keys are grouped by type: booleans first, then ints, longs, doubles and
/// strings. [`ConfigKey::ALL`] iterates them in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
#[allow(missing_docs)]
pub enum ConfigKey {
    // -- bool --
    EnableTransferStore = 0,
    EnableSharedSslSession,
    SslVerifyPeer,
    AnonymousLicenseRequest,
    PropagateUriParams,
    AsyncTune,
    FakeTune,
    EnablePlayReadyOutputProtection,
    UseSecurityManager,
    EnableAccessAttributes,
    LicenseCaching,
    EnableHwErrorRecovery,
    LicenseTransferLogging,
    // -- int --
    LicenseRetryWaitTime,
    MaxDrmSessions,
    MaxTransferBuckets,
    DrmNetworkTimeout,
    SessionTokenTimeout,
    TransferConnectTimeout,
    // -- long --
    TransferStallTimeout,
    TransferStartTimeout,
    TransferLowBwTimeout,
    // -- double --
    NetworkTimeout,
    // -- string --
    LicenseServerUrl,
    ClearKeyLicenseServerUrl,
    PlayReadyLicenseServerUrl,
    WidevineLicenseServerUrl,
    UserAgent,
    NetworkProxy,
    LicenseProxy,
    AuthToken,
    SessionTokenUrl,
    CustomLicenseData,
    LogLevel,
}

impl ConfigKey {
    /// Every key, in cell order
    pub const ALL: [ConfigKey; 34] = [
        ConfigKey::EnableTransferStore,
        ConfigKey::EnableSharedSslSession,
        ConfigKey::SslVerifyPeer,
        ConfigKey::AnonymousLicenseRequest,
        ConfigKey::PropagateUriParams,
        ConfigKey::AsyncTune,
        ConfigKey::FakeTune,
        ConfigKey::EnablePlayReadyOutputProtection,
        ConfigKey::UseSecurityManager,
        ConfigKey::EnableAccessAttributes,
        ConfigKey::LicenseCaching,
        ConfigKey::EnableHwErrorRecovery,
        ConfigKey::LicenseTransferLogging,
        ConfigKey::LicenseRetryWaitTime,
        ConfigKey::MaxDrmSessions,
        ConfigKey::MaxTransferBuckets,
        ConfigKey::DrmNetworkTimeout,
        ConfigKey::SessionTokenTimeout,
        ConfigKey::TransferConnectTimeout,
        ConfigKey::TransferStallTimeout,
        ConfigKey::TransferStartTimeout,
        ConfigKey::TransferLowBwTimeout,
        ConfigKey::NetworkTimeout,
        ConfigKey::LicenseServerUrl,
        ConfigKey::ClearKeyLicenseServerUrl,
        ConfigKey::PlayReadyLicenseServerUrl,
        ConfigKey::WidevineLicenseServerUrl,
        ConfigKey::UserAgent,
        ConfigKey::NetworkProxy,
        ConfigKey::LicenseProxy,
        ConfigKey::AuthToken,
        ConfigKey::SessionTokenUrl,
        ConfigKey::CustomLicenseData,
        ConfigKey::LogLevel,
    ];

    /// Cell index of this key
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Primitive kind this key stores
    pub fn kind(&self) -> ValueKind {
        use ConfigKey::*;
        match self {
            EnableTransferStore | EnableSharedSslSession | SslVerifyPeer
            | AnonymousLicenseRequest | PropagateUriParams | AsyncTune | FakeTune
            | EnablePlayReadyOutputProtection | UseSecurityManager | EnableAccessAttributes
            | LicenseCaching | EnableHwErrorRecovery | LicenseTransferLogging => ValueKind::Bool,
            LicenseRetryWaitTime | MaxDrmSessions | MaxTransferBuckets | DrmNetworkTimeout
            | SessionTokenTimeout | TransferConnectTimeout => ValueKind::Int,
            TransferStallTimeout | TransferStartTimeout | TransferLowBwTimeout => ValueKind::Long,
            NetworkTimeout => ValueKind::Double,
            LicenseServerUrl | ClearKeyLicenseServerUrl | PlayReadyLicenseServerUrl
            | WidevineLicenseServerUrl | UserAgent | NetworkProxy | LicenseProxy | AuthToken
            | SessionTokenUrl | CustomLicenseData | LogLevel => ValueKind::String,
        }
    }

    /// Config-file spelling of this key
    pub fn name(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            EnableTransferStore => "enableTransferStore",
            EnableSharedSslSession => "enableSharedSslSession",
            SslVerifyPeer => "sslVerifyPeer",
            AnonymousLicenseRequest => "licenseAnonymousRequest",
            PropagateUriParams => "propagateUriParameters",
            AsyncTune => "asyncTune",
            FakeTune => "fakeTune",
            EnablePlayReadyOutputProtection => "enablePROutputProtection",
            UseSecurityManager => "useSecManager",
            EnableAccessAttributes => "enableAccessAttributes",
            LicenseCaching => "setLicenseCaching",
            EnableHwErrorRecovery => "enableHwErrorRecovery",
            LicenseTransferLogging => "licenseTransferLogging",
            LicenseRetryWaitTime => "licenseRetryWaitTime",
            MaxDrmSessions => "maxDrmSessions",
            MaxTransferBuckets => "maxTransferBuckets",
            DrmNetworkTimeout => "drmNetworkTimeout",
            SessionTokenTimeout => "sessionTokenTimeout",
            TransferConnectTimeout => "transferConnectTimeout",
            TransferStallTimeout => "transferStallTimeout",
            TransferStartTimeout => "transferStartTimeout",
            TransferLowBwTimeout => "transferLowBWTimeout",
            NetworkTimeout => "networkTimeout",
            LicenseServerUrl => "licenseServerUrl",
            ClearKeyLicenseServerUrl => "ckLicenseServerUrl",
            PlayReadyLicenseServerUrl => "prLicenseServerUrl",
            WidevineLicenseServerUrl => "wvLicenseServerUrl",
            UserAgent => "userAgent",
            NetworkProxy => "networkProxy",
            LicenseProxy => "licenseProxy",
            AuthToken => "authToken",
            SessionTokenUrl => "sessionTokenUrl",
            CustomLicenseData => "customLicenseData",
            LogLevel => "logLevel",
        }
    }

    /// Inclusive numeric range for int/long/double keys, when bounded
    pub fn range(&self) -> Option<(f64, f64)> {
        use ConfigKey::*;
        match self {
            LicenseRetryWaitTime => Some((0.0, 60_000.0)),
            MaxDrmSessions => Some((1.0, 30.0)),
            MaxTransferBuckets => Some((1.0, 10.0)),
            DrmNetworkTimeout => Some((1.0, 60.0)),
            SessionTokenTimeout => Some((1.0, 60.0)),
            TransferConnectTimeout => Some((1.0, 30.0)),
            TransferStallTimeout | TransferStartTimeout | TransferLowBwTimeout => {
                Some((0.0, 600_000.0))
            }
            NetworkTimeout => Some((0.0, 60.0)),
            _ => None,
        }
    }

    /// Compiled-in default value
    pub fn default_value(&self) -> ConfigValue {
        use ConfigKey::*;
        match self {
            EnableTransferStore => ConfigValue::Bool(true),
            EnableSharedSslSession => ConfigValue::Bool(true),
            SslVerifyPeer => ConfigValue::Bool(true),
            AnonymousLicenseRequest => ConfigValue::Bool(false),
            PropagateUriParams => ConfigValue::Bool(true),
            AsyncTune => ConfigValue::Bool(false),
            FakeTune => ConfigValue::Bool(false),
            EnablePlayReadyOutputProtection => ConfigValue::Bool(false),
            UseSecurityManager => ConfigValue::Bool(false),
            EnableAccessAttributes => ConfigValue::Bool(true),
            LicenseCaching => ConfigValue::Bool(true),
            EnableHwErrorRecovery => ConfigValue::Bool(false),
            LicenseTransferLogging => ConfigValue::Bool(false),
            LicenseRetryWaitTime => ConfigValue::Int(500),
            MaxDrmSessions => ConfigValue::Int(2),
            MaxTransferBuckets => ConfigValue::Int(4),
            DrmNetworkTimeout => ConfigValue::Int(5),
            SessionTokenTimeout => ConfigValue::Int(10),
            TransferConnectTimeout => ConfigValue::Int(3),
            TransferStallTimeout => ConfigValue::Long(0),
            TransferStartTimeout => ConfigValue::Long(0),
            TransferLowBwTimeout => ConfigValue::Long(0),
            NetworkTimeout => ConfigValue::Double(10.0),
            LicenseServerUrl => ConfigValue::String(String::new()),
            ClearKeyLicenseServerUrl => ConfigValue::String(String::new()),
            PlayReadyLicenseServerUrl => ConfigValue::String(String::new()),
            WidevineLicenseServerUrl => ConfigValue::String(String::new()),
            UserAgent => ConfigValue::String("FluxPlayer/1.0".to_string()),
            NetworkProxy => ConfigValue::String(String::new()),
            LicenseProxy => ConfigValue::String(String::new()),
            AuthToken => ConfigValue::String(String::new()),
            SessionTokenUrl => {
                ConfigValue::String("http://localhost:50050/authService/getSessionToken".to_string())
            }
            CustomLicenseData => ConfigValue::String(String::new()),
            LogLevel => ConfigValue::String(String::new()),
        }
    }

    /// Look a key up by its config-file spelling
    pub fn from_name(name: &str) -> Option<ConfigKey> {
        ConfigKey::ALL.iter().copied().find(|k| k.name() == name)
    }
}
