use std::net::IpAddr;

use tracing::debug;

use crate::gateway::admission::Identifier;
use crate::gateway::error::{GatewayError, GatewayResult};
use crate::gateway::key_store::KeyStore;

/// The parts of an inbound request the gateway core looks at.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// Raw `Authorization` header value, if any.
    pub authorization: Option<String>,
    pub remote_addr: Option<IpAddr>,
}

impl InboundRequest {
    pub fn new(authorization: Option<String>, remote_addr: Option<IpAddr>) -> Self {
        Self { authorization, remote_addr }
    }

    pub fn with_bearer(token: &str) -> Self {
        Self {
            authorization: Some(format!("Bearer {}", token)),
            remote_addr: None,
        }
    }

    pub fn remote(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Token of a well-formed `Bearer` authorization, if one was presented.
    pub fn bearer(&self) -> Option<&str> {
        let header = self.authorization.as_deref()?.trim();
        let (scheme, token) = header.split_once(' ')?;
        let token = token.trim();
        if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
            Some(token)
        } else {
            None
        }
    }

    /// 有凭证时按凭证限流，否则退回到网络地址
    pub fn admission_identifier(&self) -> Identifier {
        match (self.bearer(), self.remote_addr) {
            (Some(token), _) => Identifier::Credential(token.to_string()),
            (None, Some(addr)) => Identifier::Address(addr),
            (None, None) => Identifier::Anonymous,
        }
    }
}

/// Resolves the bearer credential of a request to a caller id.
#[derive(Clone)]
pub struct Authenticator {
    keys: KeyStore,
}

impl Authenticator {
    pub fn new(keys: KeyStore) -> Self {
        Self { keys }
    }

    /// Must only run after the request passed admission.
    pub async fn authenticate(&self, request: &InboundRequest) -> GatewayResult<String> {
        let Some(token) = request.bearer() else {
            debug!(remote_addr = ?request.remote_addr, "Request carries no bearer credential");
            return Err(GatewayError::Unauthenticated);
        };
        self.keys.validate(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_header(value: &str) -> InboundRequest {
        InboundRequest::new(Some(value.to_string()), None)
    }

    #[test]
    fn parses_bearer_tokens() {
        assert_eq!(with_header("Bearer sk_abc").bearer(), Some("sk_abc"));
        assert_eq!(with_header("bearer   sk_abc ").bearer(), Some("sk_abc"));
        assert_eq!(with_header("Basic dXNlcjpwdw==").bearer(), None);
        assert_eq!(with_header("Bearer ").bearer(), None);
        assert_eq!(with_header("sk_abc").bearer(), None);
        assert_eq!(InboundRequest::default().bearer(), None);
    }

    #[test]
    fn identifier_prefers_credential_over_address() {
        let ip: IpAddr = "192.168.1.7".parse().unwrap();

        let keyed = InboundRequest::with_bearer("sk_abc").remote(ip);
        assert_eq!(keyed.admission_identifier(), Identifier::Credential("sk_abc".to_string()));

        let anonymous = InboundRequest::default().remote(ip);
        assert_eq!(anonymous.admission_identifier(), Identifier::Address(ip));

        assert_eq!(InboundRequest::default().admission_identifier(), Identifier::Anonymous);
    }
}
