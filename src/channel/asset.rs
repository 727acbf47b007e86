//! Cross-chain asset identity.
//!
//! A channel may allocate balances in assets native to different ledgers. An
//! [`Asset`] is a closed union over everything this backend can hold:
//! Solana-native assets (SOL or an SPL token, as a [`SolanaCrossAsset`] with
//! its compound identifier) and assets living on a foreign EVM ledger.
//! Equality is variant-aware throughout; a native asset never equals a token
//! asset, regardless of addresses.

use super::BACKEND_ID;
use crate::error::ValidationError;
use solana_sdk::pubkey::Pubkey;

/// Magic byte tagging the native asset in the asset's own binary form.
pub const SOL_MAGIC: u8 = 0x00;
/// Magic byte tagging an SPL token asset, followed by the mint address.
pub const SPL_MAGIC: u8 = 0x01;

/// Ledger identifier of this backend in base-58 text form.
pub const SOLANA_CONTRACT_ID: &str = "6";

/// An asset on the Solana ledger: the native currency or an SPL token.
///
/// Exactly one variant holds by construction; there is no representation of
/// an asset that is both native and a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolanaAsset {
    /// SOL. The native currency has no distinguished holding account.
    Native,
    /// An SPL token, identified by its mint address.
    Token(Pubkey),
}

impl SolanaAsset {
    /// Resolves the asset to the on-chain account holding it. `None` for the
    /// native asset, the mint address for a token.
    pub fn address(&self) -> Option<Pubkey> {
        match self {
            SolanaAsset::Native => None,
            SolanaAsset::Token(mint) => Some(*mint),
        }
    }

    /// Encodes the asset as its magic byte, followed by the mint address for
    /// tokens.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            SolanaAsset::Native => vec![SOL_MAGIC],
            SolanaAsset::Token(mint) => {
                let mut bytes = Vec::with_capacity(33);
                bytes.push(SPL_MAGIC);
                bytes.extend_from_slice(mint.as_ref());
                bytes
            }
        }
    }

    /// Decodes an asset from its magic-byte form.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ValidationError> {
        match data.split_first() {
            None => Err(ValidationError::InvalidAsset("empty asset encoding")),
            Some((&SOL_MAGIC, rest)) if rest.is_empty() => Ok(SolanaAsset::Native),
            Some((&SOL_MAGIC, _)) => Err(ValidationError::InvalidAsset(
                "native asset carries no address",
            )),
            Some((&SPL_MAGIC, rest)) => {
                let mint = Pubkey::try_from(rest)
                    .map_err(|_| ValidationError::InvalidAsset("token mint must be 32 bytes"))?;
                Ok(SolanaAsset::Token(mint))
            }
            Some((_, _)) => Err(ValidationError::InvalidAsset("unknown asset magic byte")),
        }
    }
}

/// Identifier of a contract on a specific ledger, in that ledger's native
/// text convention (base-58 here).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContractLid(String);

impl ContractLid {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Binary form: the base-58 decoding of the identifier.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ValidationError> {
        if self.0.is_empty() {
            return Err(ValidationError::InvalidAsset("contract id is empty"));
        }
        bs58::decode(&self.0)
            .into_vec()
            .map_err(|_| ValidationError::InvalidAsset("contract id is not base-58"))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ValidationError> {
        if data.is_empty() {
            return Err(ValidationError::InvalidAsset("contract id data is empty"));
        }
        Ok(Self(bs58::encode(data).into_string()))
    }
}

/// Compound identifier of a channel asset: the backend the asset lives on
/// plus the per-ledger contract identifier. Lets assets from multiple
/// ledgers coexist in one allocation without collision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ccid {
    backend_id: u32,
    ledger_id: ContractLid,
}

impl Ccid {
    /// Identifier under this backend.
    pub fn new(ledger_id: ContractLid) -> Self {
        Self {
            backend_id: BACKEND_ID,
            ledger_id,
        }
    }

    pub fn backend_id(&self) -> u32 {
        self.backend_id
    }

    pub fn ledger_id(&self) -> &ContractLid {
        &self.ledger_id
    }
}

/// A Solana asset together with its cross-chain identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolanaCrossAsset {
    id: Ccid,
    pub asset: SolanaAsset,
}

impl SolanaCrossAsset {
    /// The native SOL asset under this backend's default ledger identifier.
    pub fn sol() -> Self {
        Self {
            id: Ccid::new(ContractLid::new(SOLANA_CONTRACT_ID)),
            asset: SolanaAsset::Native,
        }
    }

    /// An SPL token asset with the given mint and ledger identifier.
    pub fn token(mint: Pubkey, ledger_id: ContractLid) -> Self {
        Self {
            id: Ccid::new(ledger_id),
            asset: SolanaAsset::Token(mint),
        }
    }

    pub fn id(&self) -> &Ccid {
        &self.id
    }
}

/// An asset a channel can hold a balance in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asset {
    /// An asset native to this ledger.
    Solana(SolanaCrossAsset),
    /// An asset native to a foreign EVM ledger, identified by its chain id
    /// and 20-byte holder address.
    Eth { chain: u64, holder: [u8; 20] },
}
