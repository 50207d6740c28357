//! Additively homomorphic encryption for private lookups
//!
//! Implements the Paillier cryptosystem over `num-bigint`:
//! - `Enc(a) * Enc(b) mod n^2` decrypts to `a + b`
//! - `Enc(m) ^ c mod n^2` decrypts to `c * m` for a known scalar `c`
//!
//! These two operations are exactly what the private-lookup query engine
//! relies on; raw ciphertext-by-ciphertext multiplication is never used.
//!
//! The node consumes its keypair through the [`AsymmetricKeyPair`] seam so
//! an alternative scheme can be swapped in, provided it preserves the
//! additive homomorphism. Password-based key persistence is an external
//! collaborator behind [`EncryptionCodec`].

use crate::error::{Result, VeilstoreError};
use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Minimum accepted modulus size in bits
pub const MIN_KEY_BITS: u64 = 128;

/// Miller-Rabin witness rounds used during key generation
const PRIMALITY_ROUNDS: usize = 20;

/// A Paillier ciphertext: an element of Z*_{n^2}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext(BigUint);

impl Ciphertext {
    /// The multiplicative identity, a trivial encryption of zero.
    ///
    /// Used to seed homomorphic accumulation; adding any ciphertext to it
    /// leaves that ciphertext's plaintext unchanged.
    pub fn zero() -> Self {
        Ciphertext(BigUint::one())
    }

    /// Big-endian byte export for the wire
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes_be()
    }

    /// Homomorphic addition: the returned ciphertext decrypts to the sum
    /// of the two plaintexts.
    pub fn add(&self, other: &Ciphertext, key: &PaillierPublicKey) -> Ciphertext {
        Ciphertext((&self.0 * &other.0) % &key.n_squared)
    }

    /// Scalar multiplication by a known plaintext: the returned ciphertext
    /// decrypts to `factor * m` where `m` is this ciphertext's plaintext.
    pub fn scale(&self, factor: &BigUint, key: &PaillierPublicKey) -> Ciphertext {
        Ciphertext(self.0.modpow(factor, &key.n_squared))
    }
}

/// The public half of a Paillier keypair (the modulus `n`, with `g = n + 1`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaillierPublicKey {
    n: BigUint,
    n_squared: BigUint,
}

impl PaillierPublicKey {
    fn from_modulus(n: BigUint) -> Result<Self> {
        if n.bits() < MIN_KEY_BITS {
            return Err(VeilstoreError::InvalidPublicKey(format!(
                "modulus too small: {} bits (min: {MIN_KEY_BITS})",
                n.bits()
            )));
        }
        let n_squared = &n * &n;
        Ok(Self { n, n_squared })
    }

    /// Parse a public key from its big-endian modulus bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_modulus(BigUint::from_bytes_be(bytes))
    }

    /// Big-endian modulus bytes for transmission with a query
    pub fn to_bytes(&self) -> Vec<u8> {
        self.n.to_bytes_be()
    }

    /// The modulus size in bits
    pub fn bits(&self) -> u64 {
        self.n.bits()
    }

    /// Largest plaintext, exclusive: values must be `< n`
    pub fn plaintext_bound(&self) -> &BigUint {
        &self.n
    }

    /// Encrypt a plaintext value under this key
    pub fn encrypt(&self, value: &BigUint) -> Result<Ciphertext> {
        if value >= &self.n {
            return Err(VeilstoreError::Encryption(format!(
                "plaintext ({} bits) exceeds the modulus ({} bits)",
                value.bits(),
                self.n.bits()
            )));
        }
        let mut rng = OsRng;
        let one = BigUint::one();
        let r = loop {
            let candidate = rng.gen_biguint_range(&one, &self.n);
            if gcd(&candidate, &self.n).is_one() {
                break candidate;
            }
        };
        // g = n + 1, so g^m mod n^2 = 1 + m*n
        let g_m = (BigUint::one() + value * &self.n) % &self.n_squared;
        let r_n = r.modpow(&self.n, &self.n_squared);
        Ok(Ciphertext((g_m * r_n) % &self.n_squared))
    }

    /// Parse an opaque ciphertext received off the wire.
    ///
    /// Rejects zero and out-of-range values; both would corrupt the
    /// homomorphic accumulation rather than fail loudly later.
    pub fn ciphertext_from_bytes(&self, bytes: &[u8]) -> Result<Ciphertext> {
        let value = BigUint::from_bytes_be(bytes);
        if value.is_zero() {
            return Err(VeilstoreError::InvalidCiphertext(
                "ciphertext must be non-zero".to_string(),
            ));
        }
        if value >= self.n_squared {
            return Err(VeilstoreError::InvalidCiphertext(
                "ciphertext exceeds the modulus square".to_string(),
            ));
        }
        Ok(Ciphertext(value))
    }
}

/// A full Paillier keypair owned by a node. The private half never leaves
/// the process; only the modulus is exported for queries.
#[derive(Debug, Clone)]
pub struct PaillierKeyPair {
    public: PaillierPublicKey,
    lambda: BigUint,
    mu: BigUint,
}

/// Serializable raw key material, exchanged only with an
/// [`EncryptionCodec`] persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMaterial {
    pub modulus: Vec<u8>,
    pub lambda: Vec<u8>,
    pub mu: Vec<u8>,
}

impl PaillierKeyPair {
    /// Generate a fresh keypair with a modulus of `bits` bits
    pub fn generate(bits: u64) -> Result<Self> {
        if bits < MIN_KEY_BITS {
            return Err(VeilstoreError::Configuration(format!(
                "key size too small: {bits} bits (min: {MIN_KEY_BITS})"
            )));
        }
        let mut rng = OsRng;
        let half = bits / 2;
        let one = BigUint::one();

        // The product of two half-width primes is bits-1 or bits wide;
        // resample until the modulus has exactly the requested width
        let (n, lambda) = loop {
            let p = generate_prime(half, &mut rng);
            let q = loop {
                let candidate = generate_prime(bits - half, &mut rng);
                if candidate != p {
                    break candidate;
                }
            };
            let n = &p * &q;
            if n.bits() == bits {
                break (n, lcm(&(&p - &one), &(&q - &one)));
            }
        };
        // With g = n + 1: L(g^lambda mod n^2) = lambda mod n, so mu = lambda^-1 mod n
        let mu = lambda
            .modinv(&n)
            .ok_or_else(|| VeilstoreError::Internal("lambda not invertible".to_string()))?;

        Ok(Self {
            public: PaillierPublicKey::from_modulus(n)?,
            lambda,
            mu,
        })
    }

    /// The public half
    pub fn public_key(&self) -> &PaillierPublicKey {
        &self.public
    }

    /// Encrypt under the public half
    pub fn encrypt(&self, value: &BigUint) -> Result<Ciphertext> {
        self.public.encrypt(value)
    }

    /// Decrypt with the private half
    pub fn decrypt(&self, ciphertext: &Ciphertext) -> Result<BigUint> {
        let n = &self.public.n;
        let n_squared = &self.public.n_squared;
        if ciphertext.0.is_zero() || &ciphertext.0 >= n_squared {
            return Err(VeilstoreError::Decryption(
                "ciphertext out of range".to_string(),
            ));
        }
        let u = ciphertext.0.modpow(&self.lambda, n_squared);
        let l = (u - BigUint::one()) / n;
        Ok((l * &self.mu) % n)
    }

    /// Export raw key material for a persistence collaborator
    pub fn to_material(&self) -> KeyMaterial {
        KeyMaterial {
            modulus: self.public.n.to_bytes_be(),
            lambda: self.lambda.to_bytes_be(),
            mu: self.mu.to_bytes_be(),
        }
    }

    /// Rebuild a keypair from raw key material
    pub fn from_material(material: &KeyMaterial) -> Result<Self> {
        let public = PaillierPublicKey::from_bytes(&material.modulus)?;
        Ok(Self {
            public,
            lambda: BigUint::from_bytes_be(&material.lambda),
            mu: BigUint::from_bytes_be(&material.mu),
        })
    }
}

/// Capability seam over a node's asymmetric keypair.
///
/// The private-lookup client only needs these three operations; the
/// Paillier implementation above is the default provider. Any replacement
/// must keep `Ciphertext::add` / `Ciphertext::scale` meaningful under its
/// exported public key.
pub trait AsymmetricKeyPair: Send + Sync {
    /// Export the public half for transmission with a query
    fn public_key_bytes(&self) -> Vec<u8>;

    /// Encrypt one value under the public half
    fn encrypt_value(&self, value: &BigUint) -> Result<Ciphertext>;

    /// Decrypt one ciphertext with the private half
    fn decrypt_value(&self, ciphertext: &Ciphertext) -> Result<BigUint>;
}

impl AsymmetricKeyPair for PaillierKeyPair {
    fn public_key_bytes(&self) -> Vec<u8> {
        self.public.to_bytes()
    }

    fn encrypt_value(&self, value: &BigUint) -> Result<Ciphertext> {
        self.encrypt(value)
    }

    fn decrypt_value(&self, ciphertext: &Ciphertext) -> Result<BigUint> {
        self.decrypt(ciphertext)
    }
}

/// Symmetric store/load of a node's private key under a password.
///
/// Implementations (key files, keychains) live outside the core; the core
/// only exchanges [`KeyMaterial`] with them.
pub trait EncryptionCodec: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Seal key material under a password
    fn seal(
        &self,
        password: &str,
        material: &KeyMaterial,
    ) -> std::result::Result<Vec<u8>, Self::Error>;

    /// Recover key material sealed with [`EncryptionCodec::seal`]
    fn open(
        &self,
        password: &str,
        sealed: &[u8],
    ) -> std::result::Result<KeyMaterial, Self::Error>;
}

fn gcd(a: &BigUint, b: &BigUint) -> BigUint {
    let mut a = a.clone();
    let mut b = b.clone();
    while !b.is_zero() {
        let r = &a % &b;
        a = b;
        b = r;
    }
    a
}

fn lcm(a: &BigUint, b: &BigUint) -> BigUint {
    (a / gcd(a, b)) * b
}

fn generate_prime(bits: u64, rng: &mut OsRng) -> BigUint {
    loop {
        let mut candidate = rng.gen_biguint(bits);
        candidate.set_bit(bits - 1, true);
        candidate.set_bit(0, true);
        if is_probable_prime(&candidate, rng) {
            return candidate;
        }
    }
}

const SMALL_PRIMES: [u32; 15] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47];

fn is_probable_prime(candidate: &BigUint, rng: &mut OsRng) -> bool {
    let one = BigUint::one();
    let two = BigUint::from(2u32);

    for &p in &SMALL_PRIMES {
        let p = BigUint::from(p);
        if candidate == &p {
            return true;
        }
        if (candidate % &p).is_zero() {
            return false;
        }
    }

    // Write candidate - 1 as d * 2^s with d odd
    let minus_one = candidate - &one;
    let mut d = minus_one.clone();
    let mut s = 0u64;
    while (&d % &two).is_zero() {
        d /= &two;
        s += 1;
    }

    'witness: for _ in 0..PRIMALITY_ROUNDS {
        let a = rng.gen_biguint_range(&two, &minus_one);
        let mut x = a.modpow(&d, candidate);
        if x == one || x == minus_one {
            continue;
        }
        for _ in 0..s.saturating_sub(1) {
            x = x.modpow(&two, candidate);
            if x == minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}
