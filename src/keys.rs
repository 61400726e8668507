//! Signing key material: SPKI parsing, fingerprint key ids, and JWK derivation.
//!
//! Key resolvers hand out raw [`KeyMaterial`]; [`SigningKey::parse`] turns it into the public
//! components published through JWKS. RSA, EC (P-256, P-384, P-521), and Ed25519 keys are
//! understood.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use base64::prelude::*;
use jsonwebtoken::{
	Algorithm, DecodingKey, EncodingKey,
	jwk::{
		AlgorithmParameters, CommonParameters, EllipticCurve, EllipticCurveKeyParameters,
		EllipticCurveKeyType, Jwk, KeyAlgorithm, OctetKeyPairParameters, OctetKeyPairType,
		PublicKeyUse, RSAKeyParameters, RSAKeyType,
	},
};
use rsa::{
	RsaPublicKey,
	pkcs8::{
		DecodePublicKey,
		der::{Document, asn1::ObjectIdentifier},
		spki::SubjectPublicKeyInfoRef,
	},
	traits::PublicKeyParts,
};
use serde::{Deserialize, Serialize};
// self
use crate::{_prelude::*, security::SpkiFingerprint};

/// Smallest RSA modulus accepted for publication.
pub const MIN_RSA_BITS: usize = 2048;

const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";
const OID_RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const OID_SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const OID_SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");
const OID_SECP521R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.35");
const OID_ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

/// Raw key material as stored by a key resolver.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyMaterial {
	/// SubjectPublicKeyInfo in PEM form (`-----BEGIN PUBLIC KEY-----`).
	pub public_key_pem: String,
	/// PKCS#8 private key in PEM form; only needed for minting tokens.
	#[serde(default, skip_serializing)]
	pub private_key_pem: Option<String>,
	/// Algorithm pinned to this key; falls back to the tenant's default signing algorithm.
	#[serde(default)]
	pub algorithm: Option<Algorithm>,
	/// Explicit key id; defaults to the SPKI fingerprint.
	#[serde(default)]
	pub kid: Option<String>,
	/// When the key was introduced; newer keys sign, older keys only verify.
	#[serde(default = "Utc::now")]
	pub created_at: DateTime<Utc>,
}
impl KeyMaterial {
	/// Wrap a public key PEM.
	pub fn from_public_pem(pem: impl Into<String>) -> Self {
		Self {
			public_key_pem: pem.into(),
			private_key_pem: None,
			algorithm: None,
			kid: None,
			created_at: Utc::now(),
		}
	}

	/// Attach the PKCS#8 private key.
	pub fn with_private_pem(mut self, pem: impl Into<String>) -> Self {
		self.private_key_pem = Some(pem.into());

		self
	}

	/// Pin the signing algorithm.
	pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
		self.algorithm = Some(algorithm);

		self
	}

	/// Pin the key id.
	pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
		self.kid = Some(kid.into());

		self
	}

	/// Override the creation timestamp.
	pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
		self.created_at = created_at;

		self
	}
}
impl Debug for KeyMaterial {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("KeyMaterial")
			.field("algorithm", &self.algorithm)
			.field("kid", &self.kid)
			.field("created_at", &self.created_at)
			.field("private_key_pem", &self.private_key_pem.as_ref().map(|_| "<redacted>"))
			.finish_non_exhaustive()
	}
}

/// Key family with the curve where one applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyFamily {
	/// RSA keys (`kty=RSA`).
	Rsa,
	/// NIST P-256 (`kty=EC`).
	P256,
	/// NIST P-384 (`kty=EC`).
	P384,
	/// NIST P-521 (`kty=EC`).
	P521,
	/// Ed25519 (`kty=OKP`).
	Ed25519,
}
impl KeyFamily {
	/// Whether JWTs signed with `algorithm` can be verified by keys of this family.
	pub fn supports(self, algorithm: Algorithm) -> bool {
		matches!(
			(self, algorithm),
			(
				Self::Rsa,
				Algorithm::RS256
					| Algorithm::RS384
					| Algorithm::RS512
					| Algorithm::PS256
					| Algorithm::PS384
					| Algorithm::PS512
			) | (Self::P256, Algorithm::ES256)
				| (Self::P384, Algorithm::ES384)
				| (Self::Ed25519, Algorithm::EdDSA)
		)
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum PublicComponents {
	Rsa { n: String, e: String },
	Ec { curve: EllipticCurve, x: String, y: String },
	Okp { x: String },
}

/// Parsed signing key ready for JWKS publication.
#[derive(Clone)]
pub struct SigningKey {
	kid: String,
	fingerprint: SpkiFingerprint,
	family: KeyFamily,
	algorithm: Option<Algorithm>,
	created_at: DateTime<Utc>,
	public: PublicComponents,
	private_key_pem: Option<Arc<str>>,
}
impl SigningKey {
	/// Parse key material, deriving the fingerprint and public components.
	pub fn parse(material: &KeyMaterial) -> Result<Self> {
		let (label, document) = Document::from_pem(material.public_key_pem.trim())
			.map_err(|err| Error::MalformedKey(format!("Invalid PEM encoding: {err}.")))?;

		if label != PUBLIC_KEY_LABEL {
			return Err(Error::MalformedKey(format!(
				"Expected a '{PUBLIC_KEY_LABEL}' PEM block, found '{label}'."
			)));
		}

		let der = document.as_bytes();
		let spki = SubjectPublicKeyInfoRef::try_from(der)
			.map_err(|err| Error::MalformedKey(format!("Invalid SubjectPublicKeyInfo: {err}.")))?;
		let (family, public) = decode_public_components(der, &spki)?;
		let fingerprint = SpkiFingerprint::of_spki(der);
		let kid = match &material.kid {
			Some(kid) if kid.trim().is_empty() =>
				return Err(Error::MalformedKey("Pinned kid must not be empty.".into())),
			Some(kid) => kid.clone(),
			None => fingerprint.to_kid(),
		};

		if let Some(algorithm) = material.algorithm
			&& !family.supports(algorithm)
		{
			return Err(Error::MalformedKey(format!(
				"Algorithm {algorithm:?} cannot be used with a {family:?} key."
			)));
		}

		Ok(Self {
			kid,
			fingerprint,
			family,
			algorithm: material.algorithm,
			created_at: material.created_at,
			public,
			private_key_pem: material.private_key_pem.as_deref().map(Arc::from),
		})
	}

	/// Key id published in the JWK.
	pub fn kid(&self) -> &str {
		&self.kid
	}

	/// SHA-256 fingerprint of the SubjectPublicKeyInfo.
	pub fn fingerprint(&self) -> &SpkiFingerprint {
		&self.fingerprint
	}

	/// Key family.
	pub fn family(&self) -> KeyFamily {
		self.family
	}

	/// Algorithm pinned on the key material, if any.
	pub fn algorithm(&self) -> Option<Algorithm> {
		self.algorithm
	}

	/// When the key was introduced.
	pub fn created_at(&self) -> DateTime<Utc> {
		self.created_at
	}

	/// Effective algorithm: the pinned one, else `default` when the key family supports it.
	pub fn effective_algorithm(&self, default: Algorithm) -> Result<Algorithm> {
		let algorithm = self.algorithm.unwrap_or(default);

		if self.family.supports(algorithm) {
			Ok(algorithm)
		} else {
			Err(Error::MalformedKey(format!(
				"Key '{}' ({:?}) cannot be published for {algorithm:?}.",
				self.kid, self.family
			)))
		}
	}

	/// Render the public JWK for `algorithm`.
	pub fn to_jwk(&self, algorithm: Algorithm) -> Jwk {
		let common = CommonParameters {
			public_key_use: Some(PublicKeyUse::Signature),
			key_algorithm: Some(key_algorithm(algorithm)),
			key_id: Some(self.kid.clone()),
			..Default::default()
		};
		let algorithm = match &self.public {
			PublicComponents::Rsa { n, e } => AlgorithmParameters::RSA(RSAKeyParameters {
				key_type: RSAKeyType::RSA,
				n: n.clone(),
				e: e.clone(),
			}),
			PublicComponents::Ec { curve, x, y } =>
				AlgorithmParameters::EllipticCurve(EllipticCurveKeyParameters {
					key_type: EllipticCurveKeyType::EC,
					curve: curve.clone(),
					x: x.clone(),
					y: y.clone(),
				}),
			PublicComponents::Okp { x } => AlgorithmParameters::OctetKeyPair(OctetKeyPairParameters {
				key_type: OctetKeyPairType::OctetKeyPair,
				curve: EllipticCurve::Ed25519,
				x: x.clone(),
			}),
		};

		Jwk { common, algorithm }
	}

	/// Verification key for tokens signed with this key.
	pub fn decoding_key(&self, algorithm: Algorithm) -> Result<DecodingKey> {
		Ok(DecodingKey::from_jwk(&self.to_jwk(algorithm))?)
	}

	/// Signing key, when the private half was supplied.
	pub fn encoding_key(&self) -> Result<EncodingKey> {
		let pem = self.private_key_pem.as_deref().ok_or_else(|| {
			Error::MalformedKey(format!("Key '{}' carries no private key.", self.kid))
		})?;
		let key = match self.family {
			KeyFamily::Rsa => EncodingKey::from_rsa_pem(pem.as_bytes())?,
			KeyFamily::P256 | KeyFamily::P384 | KeyFamily::P521 =>
				EncodingKey::from_ec_pem(pem.as_bytes())?,
			KeyFamily::Ed25519 => EncodingKey::from_ed_pem(pem.as_bytes())?,
		};

		Ok(key)
	}
}
impl Debug for SigningKey {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("SigningKey")
			.field("kid", &self.kid)
			.field("family", &self.family)
			.field("algorithm", &self.algorithm)
			.field("created_at", &self.created_at)
			.finish_non_exhaustive()
	}
}

fn decode_public_components(
	der: &[u8],
	spki: &SubjectPublicKeyInfoRef<'_>,
) -> Result<(KeyFamily, PublicComponents)> {
	let oid = spki.algorithm.oid;

	if oid == OID_RSA_ENCRYPTION {
		let key = RsaPublicKey::from_public_key_der(der)
			.map_err(|err| Error::MalformedKey(format!("Invalid RSA public key: {err}.")))?;
		let bits = key.size() * 8;

		if bits < MIN_RSA_BITS {
			return Err(Error::MalformedKey(format!(
				"RSA modulus of {bits} bits is below the {MIN_RSA_BITS}-bit minimum."
			)));
		}

		let n = BASE64_URL_SAFE_NO_PAD.encode(key.n().to_bytes_be());
		let e = BASE64_URL_SAFE_NO_PAD.encode(key.e().to_bytes_be());

		return Ok((KeyFamily::Rsa, PublicComponents::Rsa { n, e }));
	}

	let point = spki
		.subject_public_key
		.as_bytes()
		.ok_or_else(|| Error::MalformedKey("Public key bit string is not octet aligned.".into()))?;

	if oid == OID_EC_PUBLIC_KEY {
		let curve_oid = spki
			.algorithm
			.parameters_oid()
			.map_err(|err| Error::MalformedKey(format!("Missing EC curve parameters: {err}.")))?;
		let (family, curve, coordinate_len) = if curve_oid == OID_SECP256R1 {
			(KeyFamily::P256, EllipticCurve::P256, 32)
		} else if curve_oid == OID_SECP384R1 {
			(KeyFamily::P384, EllipticCurve::P384, 48)
		} else if curve_oid == OID_SECP521R1 {
			(KeyFamily::P521, EllipticCurve::P521, 66)
		} else {
			return Err(Error::MalformedKey(format!("Unsupported EC curve {curve_oid}.")));
		};

		// Only the uncompressed SEC1 form (0x04 || X || Y) carries both coordinates.
		if point.len() != 1 + 2 * coordinate_len || point[0] != 0x04 {
			return Err(Error::MalformedKey("EC point must be uncompressed.".into()));
		}

		let (x, y) = point[1..].split_at(coordinate_len);

		return Ok((
			family,
			PublicComponents::Ec {
				curve,
				x: BASE64_URL_SAFE_NO_PAD.encode(x),
				y: BASE64_URL_SAFE_NO_PAD.encode(y),
			},
		));
	}

	if oid == OID_ED25519 {
		if point.len() != 32 {
			return Err(Error::MalformedKey("Ed25519 public keys must be 32 bytes.".into()));
		}

		return Ok((
			KeyFamily::Ed25519,
			PublicComponents::Okp { x: BASE64_URL_SAFE_NO_PAD.encode(point) },
		));
	}

	Err(Error::MalformedKey(format!("Unsupported key algorithm {oid}.")))
}

fn key_algorithm(algorithm: Algorithm) -> KeyAlgorithm {
	match algorithm {
		Algorithm::HS256 => KeyAlgorithm::HS256,
		Algorithm::HS384 => KeyAlgorithm::HS384,
		Algorithm::HS512 => KeyAlgorithm::HS512,
		Algorithm::ES256 => KeyAlgorithm::ES256,
		Algorithm::ES384 => KeyAlgorithm::ES384,
		Algorithm::RS256 => KeyAlgorithm::RS256,
		Algorithm::RS384 => KeyAlgorithm::RS384,
		Algorithm::RS512 => KeyAlgorithm::RS512,
		Algorithm::PS256 => KeyAlgorithm::PS256,
		Algorithm::PS384 => KeyAlgorithm::PS384,
		Algorithm::PS512 => KeyAlgorithm::PS512,
		Algorithm::EdDSA => KeyAlgorithm::EdDSA,
	}
}
