//! The git services the gateway is willing to run.

use crate::GitError;
use std::fmt;
use std::str::FromStr;

/// Prefix carried by service names on the wire (`git-upload-pack`).
const WIRE_PREFIX: &str = "git-";

/// A smart HTTP service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Fetch and clone.
    UploadPack,
    /// Push.
    ReceivePack,
}

impl Service {
    /// Every allowed service.
    pub const ALL: [Service; 2] = [Service::UploadPack, Service::ReceivePack];

    /// Parses the `service` query value, which carries a `git-` prefix.
    ///
    /// The prefix is stripped once; a bare name is accepted as well.
    pub fn from_query(value: &str) -> Result<Self, GitError> {
        value
            .strip_prefix(WIRE_PREFIX)
            .unwrap_or(value)
            .parse()
    }

    /// The name passed to `git` as its subcommand.
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::UploadPack => "upload-pack",
            Service::ReceivePack => "receive-pack",
        }
    }

    /// The prefixed name used in URLs and the service announcement.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Service::UploadPack => "git-upload-pack",
            Service::ReceivePack => "git-receive-pack",
        }
    }

    /// Media type of the refs advertisement.
    pub fn advertisement_content_type(&self) -> &'static str {
        match self {
            Service::UploadPack => "application/x-git-upload-pack-advertisement",
            Service::ReceivePack => "application/x-git-receive-pack-advertisement",
        }
    }

    /// Media type of the RPC result.
    pub fn result_content_type(&self) -> &'static str {
        match self {
            Service::UploadPack => "application/x-git-upload-pack-result",
            Service::ReceivePack => "application/x-git-receive-pack-result",
        }
    }

    /// The announcement line that precedes a refs advertisement.
    pub fn announcement(&self) -> String {
        format!("# service={}\n", self.wire_name())
    }

    /// Arguments for listing refs in stateless-RPC mode.
    pub fn advertise_args(&self) -> [&'static str; 4] {
        [self.as_str(), "--stateless-rpc", "--advertise-refs", "."]
    }

    /// Arguments for one stateless-RPC exchange.
    pub fn rpc_args(&self) -> [&'static str; 3] {
        [self.as_str(), "--stateless-rpc", "."]
    }
}

impl FromStr for Service {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload-pack" => Ok(Service::UploadPack),
            "receive-pack" => Ok(Service::ReceivePack),
            other => Err(GitError::InvalidService(other.to_string())),
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_allowed_services() {
        assert_eq!("upload-pack".parse::<Service>().unwrap(), Service::UploadPack);
        assert_eq!(
            "receive-pack".parse::<Service>().unwrap(),
            Service::ReceivePack
        );
    }

    #[test]
    fn test_parse_rejects_prefixed_and_unknown() {
        assert!("git-upload-pack".parse::<Service>().is_err());
        assert!("upload-archive".parse::<Service>().is_err());
        assert!("".parse::<Service>().is_err());
        assert!("Upload-Pack".parse::<Service>().is_err());
    }

    #[test]
    fn test_from_query_strips_prefix_once() {
        assert_eq!(
            Service::from_query("git-upload-pack").unwrap(),
            Service::UploadPack
        );
        assert_eq!(
            Service::from_query("receive-pack").unwrap(),
            Service::ReceivePack
        );
        assert!(Service::from_query("git-git-upload-pack").is_err());
    }

    #[test]
    fn test_invalid_service_message() {
        let err = Service::from_query("git-foo").unwrap_err();
        assert_eq!(err.to_string(), "invalid service \"foo\"");
    }

    #[test]
    fn test_content_types() {
        assert_eq!(
            Service::UploadPack.advertisement_content_type(),
            "application/x-git-upload-pack-advertisement"
        );
        assert_eq!(
            Service::ReceivePack.result_content_type(),
            "application/x-git-receive-pack-result"
        );
    }

    #[test]
    fn test_announcement() {
        assert_eq!(
            Service::UploadPack.announcement(),
            "# service=git-upload-pack\n"
        );
    }

    #[test]
    fn test_args() {
        assert_eq!(
            Service::ReceivePack.advertise_args(),
            ["receive-pack", "--stateless-rpc", "--advertise-refs", "."]
        );
        assert_eq!(
            Service::UploadPack.rpc_args(),
            ["upload-pack", "--stateless-rpc", "."]
        );
    }

    proptest! {
        #[test]
        fn prop_only_two_names_parse(s in ".*") {
            let allowed = Service::ALL.iter().any(|svc| svc.as_str() == s);
            prop_assert_eq!(s.parse::<Service>().is_ok(), allowed);
        }
    }
}
