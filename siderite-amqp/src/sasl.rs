//! SASL profiles for the connection handshake
//!
//! The kernel neither hashes nor canonicalises credentials; a profile
//! only exposes its mechanism name and response bytes, and the handshake
//! checks the name against the server's advertised list.

use bytes::BufMut;

pub(crate) const PLAIN: &str = "PLAIN";
pub(crate) const EXTERNAL: &str = "EXTERNAL";

/// SASL profile selected for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaslProfile {
    /// The PLAIN mechanism: `\0user\0password`.
    Plain {
        /// Username
        username: String,
        /// Password
        password: String,
    },

    /// The EXTERNAL mechanism: identity established outside the
    /// protocol, typically through a TLS client certificate.
    External,
}

impl Default for SaslProfile {
    fn default() -> Self {
        Self::Plain {
            username: "guest".to_owned(),
            password: "guest".to_owned(),
        }
    }
}

impl<T1, T2> From<(T1, T2)> for SaslProfile
where
    T1: Into<String>,
    T2: Into<String>,
{
    fn from((username, password): (T1, T2)) -> Self {
        Self::Plain {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl SaslProfile {
    /// The mechanism name sent in `connection.start-ok`.
    pub fn mechanism(&self) -> &'static str {
        match self {
            SaslProfile::Plain { .. } => PLAIN,
            SaslProfile::External => EXTERNAL,
        }
    }

    /// The initial response bytes for the mechanism.
    pub fn response(&self) -> Vec<u8> {
        match self {
            SaslProfile::Plain { username, password } => {
                let mut buf = Vec::with_capacity(username.len() + password.len() + 2);
                buf.put_u8(0);
                buf.put_slice(username.as_bytes());
                buf.put_u8(0);
                buf.put_slice(password.as_bytes());
                buf
            }
            SaslProfile::External => Vec::new(),
        }
    }

    /// Whether the server's space-separated mechanism list offers this
    /// profile's mechanism.
    pub fn offered_in(&self, mechanisms: &str) -> bool {
        mechanisms
            .split_ascii_whitespace()
            .any(|mechanism| mechanism == self.mechanism())
    }
}

#[cfg(test)]
mod tests {
    use super::SaslProfile;

    #[test]
    fn plain_response_layout() {
        let profile = SaslProfile::from(("guest", "guest"));
        assert_eq!(profile.mechanism(), "PLAIN");
        assert_eq!(profile.response(), b"\x00guest\x00guest");
    }

    #[test]
    fn mechanism_selection() {
        let profile = SaslProfile::default();
        assert!(profile.offered_in("PLAIN EXTERNAL"));
        assert!(profile.offered_in("AMQPLAIN PLAIN"));
        assert!(!profile.offered_in("AMQPLAIN EXTERNAL"));

        assert!(SaslProfile::External.offered_in("PLAIN EXTERNAL"));
        assert!(!SaslProfile::External.offered_in("PLAIN"));
    }
}
