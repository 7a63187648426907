use once_cell::sync::Lazy;

use crate::protocol::ClientSdkInfo;

/// The version of the library.
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub(crate) const USER_AGENT: &str = concat!("sentry-zig/", env!("CARGO_PKG_VERSION"));

pub(crate) static SDK_INFO: Lazy<ClientSdkInfo> = Lazy::new(|| ClientSdkInfo {
    name: "sentry-zig".into(),
    version: VERSION.into(),
});
