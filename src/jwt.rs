//! JWT token encoding and verification.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Algorithm used when none is configured.
pub const DEFAULT_ALGORITHM: Algorithm = Algorithm::HS512;

/// Claims set by the policy itself; callers cannot supply `iat` or `exp`.
pub const RESERVED_CLAIMS: [&str; 4] = ["sub", "iat", "exp", "aud"];

/// Claims carried by a token, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Merge `other` into these claims; keys in `other` win.
    pub fn merge(&mut self, other: Claims) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Subject (principal), when it is a string.
    pub fn sub(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }

    /// Issued-at as Unix seconds.
    pub fn iat(&self) -> Option<f64> {
        self.numeric("iat")
    }

    /// Expiration as Unix seconds.
    pub fn exp(&self) -> Option<f64> {
        self.numeric("exp")
    }

    pub fn nbf(&self) -> Option<f64> {
        self.numeric("nbf")
    }

    fn numeric(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Copy of these claims without the reserved keys.
    pub fn without_reserved(&self) -> Claims {
        let mut claims = self.clone();
        for key in RESERVED_CLAIMS {
            claims.0.remove(key);
        }
        claims
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Claims {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Source of the current time in Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> Result<u64, JwtError>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<u64, JwtError> {
        Ok(SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs())
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    pub fn advance(&self, by: Duration) {
        self.0.fetch_add(by.as_secs(), Ordering::SeqCst);
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<u64, JwtError> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

/// Turns claims into the JSON payload that gets signed.
///
/// Injected into the codec at construction; the payload must be a JSON object.
pub trait ClaimSerializer: Send + Sync {
    fn to_payload(&self, claims: &Claims) -> Result<Value, JwtError>;
}

/// Signs claims exactly as given.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonClaims;

impl ClaimSerializer for JsonClaims {
    fn to_payload(&self, claims: &Claims) -> Result<Value, JwtError> {
        Ok(Value::Object(claims.0.clone()))
    }
}

/// Parse an algorithm identifier such as `HS512` or `RS256`.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, JwtError> {
    Algorithm::from_str(name).map_err(|_| JwtError::UnknownAlgorithm(name.to_string()))
}

/// Whether the algorithm signs and verifies with one shared secret.
pub fn is_symmetric(algorithm: Algorithm) -> bool {
    matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    )
}

/// Signs claims into compact tokens and verifies them back.
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    leeway: u64,
    audience: Option<String>,
    serializer: Arc<dyn ClaimSerializer>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("leeway", &self.leeway)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec for `algorithm`.
    ///
    /// `HS*` algorithms sign and verify with `private_key` as a shared secret
    /// and ignore `public_key`. Every other family expects PEM keys and needs
    /// `public_key` for verification.
    pub fn new(
        algorithm: Algorithm,
        private_key: &[u8],
        public_key: Option<&[u8]>,
    ) -> Result<Self, JwtError> {
        let (encoding_key, decoding_key) = key_pair(algorithm, private_key, public_key)?;
        Ok(Self {
            algorithm,
            encoding_key,
            decoding_key,
            leeway: 0,
            audience: None,
            serializer: Arc::new(JsonClaims),
        })
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway.as_secs();
        self
    }

    pub fn with_audience(mut self, audience: Option<String>) -> Self {
        self.audience = audience.filter(|a| !a.is_empty());
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn ClaimSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn leeway(&self) -> Duration {
        Duration::from_secs(self.leeway)
    }

    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    /// Sign `claims` into a compact token.
    pub fn encode(&self, claims: &Claims) -> Result<String, JwtError> {
        let payload = self.serializer.to_payload(claims)?;
        if !payload.is_object() {
            return Err(JwtError::InvalidPayload);
        }
        jsonwebtoken::encode(&Header::new(self.algorithm), &payload, &self.encoding_key)
            .map_err(JwtError::Encoding)
    }

    /// Verify `token` and return its claims.
    ///
    /// Signature and audience are checked by `jsonwebtoken`; `exp` and `nbf`
    /// are checked against `now` with the configured leeway.
    pub fn decode(&self, token: &str, now: u64) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = self.leeway;
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims = HashSet::new();
        if let Some(audience) = &self.audience {
            validation.set_audience(&[audience]);
            validation.set_required_spec_claims(&["aud"]);
        }

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(JwtError::Decoding)?;
        let claims = data.claims;

        let now = now as f64;
        let leeway = self.leeway as f64;
        if claims.contains_key("exp") {
            let exp = claims.exp().ok_or(JwtError::InvalidClaim("exp"))?;
            if exp <= now - leeway {
                return Err(JwtError::Expired);
            }
        }
        if claims.contains_key("nbf") {
            let nbf = claims.nbf().ok_or(JwtError::InvalidClaim("nbf"))?;
            if nbf > now + leeway {
                return Err(JwtError::NotYetValid);
            }
        }

        Ok(claims)
    }
}

fn key_pair(
    algorithm: Algorithm,
    private_key: &[u8],
    public_key: Option<&[u8]>,
) -> Result<(EncodingKey, DecodingKey), JwtError> {
    if is_symmetric(algorithm) {
        if private_key.is_empty() {
            return Err(JwtError::MissingKey);
        }
        return Ok((
            EncodingKey::from_secret(private_key),
            DecodingKey::from_secret(private_key),
        ));
    }

    let public_key = public_key.ok_or(JwtError::MissingPublicKey)?;
    let pair = match algorithm {
        Algorithm::ES256 | Algorithm::ES384 => (
            EncodingKey::from_ec_pem(private_key),
            DecodingKey::from_ec_pem(public_key),
        ),
        Algorithm::EdDSA => (
            EncodingKey::from_ed_pem(private_key),
            DecodingKey::from_ed_pem(public_key),
        ),
        _ => (
            EncodingKey::from_rsa_pem(private_key),
            DecodingKey::from_rsa_pem(public_key),
        ),
    };
    Ok((
        pair.0.map_err(JwtError::InvalidKey)?,
        pair.1.map_err(JwtError::InvalidKey)?,
    ))
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding or verifying the token
    Decoding(jsonwebtoken::errors::Error),
    /// Key material could not be parsed
    InvalidKey(jsonwebtoken::errors::Error),
    /// No signing key configured
    MissingKey,
    /// Asymmetric algorithm without a verification key
    MissingPublicKey,
    /// Algorithm name not recognised
    UnknownAlgorithm(String),
    /// Token is past its `exp`
    Expired,
    /// Token is before its `nbf`
    NotYetValid,
    /// A registered claim has the wrong type
    InvalidClaim(&'static str),
    /// Claim serializer produced something other than an object
    InvalidPayload,
    /// System time error
    TimeError,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::InvalidKey(e) => write!(f, "Invalid key material: {}", e),
            JwtError::MissingKey => write!(f, "Signing key is required"),
            JwtError::MissingPublicKey => {
                write!(f, "Asymmetric algorithms require a public key")
            }
            JwtError::UnknownAlgorithm(name) => write!(f, "Unknown algorithm: {}", name),
            JwtError::Expired => write!(f, "Signature has expired"),
            JwtError::NotYetValid => write!(f, "The token is not yet valid (nbf)"),
            JwtError::InvalidClaim(claim) => write!(f, "Claim {} must be a number", claim),
            JwtError::InvalidPayload => write!(f, "Claims must serialize to a JSON object"),
            JwtError::TimeError => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for JwtError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &[u8] = b"test-secret-key-for-testing";
    const NOW: u64 = 1_700_000_000;

    fn codec() -> TokenCodec {
        TokenCodec::new(DEFAULT_ALGORITHM, SECRET, None).unwrap()
    }

    fn claims(sub: &str, iat: u64) -> Claims {
        Claims::from_iter([("sub", json!(sub)), ("iat", json!(iat))])
    }

    #[test]
    fn test_encode_and_decode() {
        let codec = codec();
        let mut input = claims("alice", NOW);
        input.insert("role", "admin");

        let token = codec.encode(&input).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let decoded = codec.decode(&token, NOW).unwrap();
        assert_eq!(decoded, input);
        assert_eq!(decoded.sub(), Some("alice"));
        assert_eq!(decoded.iat(), Some(NOW as f64));
    }

    #[test]
    fn test_claim_order_preserved() {
        let codec = codec();
        let input = Claims::from_iter([("zeta", 1), ("alpha", 2), ("mid", 3)]);

        let decoded = codec.decode(&codec.encode(&input).unwrap(), NOW).unwrap();
        let keys: Vec<_> = decoded.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_invalid_token() {
        assert!(codec().decode("invalid-token", NOW).is_err());
        assert!(codec().decode("", NOW).is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let other = TokenCodec::new(DEFAULT_ALGORITHM, b"secret-2", None).unwrap();
        let token = other.encode(&claims("alice", NOW)).unwrap();

        assert!(matches!(
            codec().decode(&token, NOW),
            Err(JwtError::Decoding(_))
        ));
    }

    #[test]
    fn test_wrong_algorithm() {
        let hs256 = TokenCodec::new(Algorithm::HS256, SECRET, None).unwrap();
        let token = hs256.encode(&claims("alice", NOW)).unwrap();

        assert!(codec().decode(&token, NOW).is_err());
    }

    #[test]
    fn test_tampered_token_rejected_at_every_position() {
        let codec = codec();
        let token = codec.encode(&claims("alice", NOW)).unwrap();

        for (i, c) in token.char_indices() {
            let replacement = if c == 'A' { 'B' } else { 'A' };
            let mut tampered = token.clone();
            tampered.replace_range(i..i + 1, &replacement.to_string());
            assert!(
                codec.decode(&tampered, NOW).is_err(),
                "Tampering at position {} should be detected",
                i
            );
        }
    }

    #[test]
    fn test_expired_token() {
        let codec = codec();
        let mut input = claims("alice", NOW - 100);
        input.insert("exp", NOW - 50);

        let token = codec.encode(&input).unwrap();
        assert!(matches!(codec.decode(&token, NOW), Err(JwtError::Expired)));
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = codec();
        let mut input = claims("alice", NOW);
        input.insert("exp", NOW + 1);
        let token = codec.encode(&input).unwrap();

        assert!(codec.decode(&token, NOW).is_ok());
        assert!(matches!(
            codec.decode(&token, NOW + 1),
            Err(JwtError::Expired)
        ));
    }

    #[test]
    fn test_leeway_tolerates_clock_skew() {
        let codec = codec().with_leeway(Duration::from_secs(10));
        let mut input = claims("alice", NOW - 100);
        input.insert("exp", NOW - 5);
        let token = codec.encode(&input).unwrap();

        assert!(codec.decode(&token, NOW).is_ok());
        assert!(codec.decode(&token, NOW + 10).is_err());
    }

    #[test]
    fn test_not_before() {
        let codec = codec();
        let mut input = claims("alice", NOW);
        input.insert("nbf", NOW + 60);
        let token = codec.encode(&input).unwrap();

        assert!(matches!(
            codec.decode(&token, NOW),
            Err(JwtError::NotYetValid)
        ));
        assert!(codec.decode(&token, NOW + 60).is_ok());
    }

    #[test]
    fn test_non_numeric_exp_rejected() {
        let codec = codec();
        let mut input = claims("alice", NOW);
        input.insert("exp", "tomorrow");
        let token = codec.encode(&input).unwrap();

        assert!(codec.decode(&token, NOW).is_err());
    }

    #[test]
    fn test_audience() {
        let codec = codec().with_audience(Some("api".to_string()));

        let mut matching = claims("alice", NOW);
        matching.insert("aud", "api");
        let token = codec.encode(&matching).unwrap();
        assert!(codec.decode(&token, NOW).is_ok());

        let mut other = claims("alice", NOW);
        other.insert("aud", "web");
        let token = codec.encode(&other).unwrap();
        assert!(codec.decode(&token, NOW).is_err());

        let token = codec.encode(&claims("alice", NOW)).unwrap();
        assert!(
            codec.decode(&token, NOW).is_err(),
            "A configured audience makes aud mandatory"
        );
    }

    #[test]
    fn test_asymmetric_requires_public_key() {
        let result = TokenCodec::new(Algorithm::RS256, b"not-a-pem", None);
        assert!(matches!(result, Err(JwtError::MissingPublicKey)));

        let result = TokenCodec::new(Algorithm::RS256, b"not-a-pem", Some(b"not-a-pem"));
        assert!(matches!(result, Err(JwtError::InvalidKey(_))));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            TokenCodec::new(Algorithm::HS256, b"", None),
            Err(JwtError::MissingKey)
        ));
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(parse_algorithm("HS512").unwrap(), Algorithm::HS512);
        assert_eq!(parse_algorithm("ES256").unwrap(), Algorithm::ES256);
        assert!(matches!(
            parse_algorithm("none"),
            Err(JwtError::UnknownAlgorithm(_))
        ));
        assert!(is_symmetric(Algorithm::HS384));
        assert!(!is_symmetric(Algorithm::PS256));
    }

    struct Stamped;

    impl ClaimSerializer for Stamped {
        fn to_payload(&self, claims: &Claims) -> Result<Value, JwtError> {
            let mut map = claims.as_map().clone();
            map.insert("iss".to_string(), json!("cookiejwt"));
            Ok(Value::Object(map))
        }
    }

    struct NotAnObject;

    impl ClaimSerializer for NotAnObject {
        fn to_payload(&self, _claims: &Claims) -> Result<Value, JwtError> {
            Ok(json!([1, 2, 3]))
        }
    }

    #[test]
    fn test_injected_serializer() {
        let codec = codec().with_serializer(Arc::new(Stamped));
        let token = codec.encode(&claims("alice", NOW)).unwrap();

        let decoded = codec.decode(&token, NOW).unwrap();
        assert_eq!(decoded.get("iss"), Some(&json!("cookiejwt")));

        let codec = codec.with_serializer(Arc::new(NotAnObject));
        assert!(matches!(
            codec.encode(&claims("alice", NOW)),
            Err(JwtError::InvalidPayload)
        ));
    }

    #[test]
    fn test_without_reserved() {
        let mut input = claims("alice", NOW);
        input.insert("exp", NOW + 10);
        input.insert("aud", "api");
        input.insert("role", "admin");

        let stripped = input.without_reserved();
        assert_eq!(stripped, Claims::from_iter([("role", "admin")]));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(NOW);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now().unwrap(), NOW + 2);
        clock.set(5);
        assert_eq!(clock.now().unwrap(), 5);
    }
}
