//! Workstation identity stamped onto every outgoing payload.
//!
//! Hostname and OS are captured once per process; they cannot change under
//! a running editor window and sysinfo lookups are not free.

use once_cell::sync::Lazy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub hostname: String,
    pub os: String,
}

static HOST_IDENTITY: Lazy<HostIdentity> = Lazy::new(|| HostIdentity {
    hostname: sysinfo::System::host_name().unwrap_or_else(|| "unknown-host".to_string()),
    os: sysinfo::System::long_os_version()
        .or_else(sysinfo::System::name)
        .unwrap_or_else(|| std::env::consts::OS.to_string()),
});

pub fn host_identity() -> &'static HostIdentity {
    &HOST_IDENTITY
}
