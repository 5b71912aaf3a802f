//! Content identifier used as the search/announce key and the bucket key.

use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

use rand::Rng;

use crate::{Error, Result};

/// The size of identifiers in bytes.
pub const ID_SIZE: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
/// A 20-byte identifier derived from a content name.
pub struct Id(pub [u8; ID_SIZE]);

impl Id {
    pub fn random() -> Id {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; ID_SIZE] = rng.gen();

        Id(random_bytes)
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE].
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id> {
        let bytes = bytes.as_ref();
        if bytes.len() != ID_SIZE {
            return Err(Error::InvalidIdSize(bytes.len()));
        }

        let mut tmp: [u8; ID_SIZE] = [0; ID_SIZE];
        tmp[..ID_SIZE].clone_from_slice(&bytes[..ID_SIZE]);

        Ok(Id(tmp))
    }

    /// Derive the identifier for a query string.
    ///
    /// A 40-digit hex query decodes directly; any other query is hashed with
    /// SHA-1, so arbitrary content names map into the keyspace.
    pub fn from_query(query: &str) -> Id {
        if query.len() == 2 * ID_SIZE {
            if let Ok(id) = query.parse() {
                return id;
            }
        }

        let mut hasher = sha1_smol::Sha1::new();
        hasher.update(query.as_bytes());

        Id(hasher.digest().bytes())
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self)
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Id> {
        let bytes = hex::decode(s).map_err(|_| Error::InvalidIdEncoding(s.to_string()))?;

        Id::from_bytes(bytes)
    }
}
