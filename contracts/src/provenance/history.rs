//! Provenance of an upgradeable contract.
//!
//! Each upgrade publishes a new record with [`ProvenanceHistory::_push`].
//! Records are appended and never modified, so the source of every version
//! the contract ever ran stays discoverable. [`ISourceProvenance::provenance`]
//! returns the latest record.
use alloc::{string::String, vec, vec::Vec};

use alloy_primitives::{aliases::B32, U256};
use stylus_sdk::{
    evm, function_selector,
    prelude::*,
    storage::{StorageString, StorageVec},
};

pub use self::sol::*;
use super::{
    check_record, Error, ISourceProvenance, ProvenanceIndexOutOfBounds,
};
use crate::utils::introspection::erc165::IErc165;

#[cfg_attr(coverage_nightly, coverage(off))]
mod sol {
    use alloy_sol_macro::sol;

    sol! {
        /// Emitted when a new provenance record is published.
        ///
        /// * `index` - Position of the record in the history.
        /// * `repository_type` - Version control system.
        /// * `repository_url` - Clone URL of the repository.
        /// * `commit_hash` - Full commit hash of the source.
        #[derive(Debug)]
        #[allow(missing_docs)]
        event ProvenanceUpdated(
            uint256 indexed index,
            string repository_type,
            string repository_url,
            string commit_hash
        );
    }
}

/// State of a single [`ProvenanceHistory`] entry.
#[storage]
pub struct ProvenanceEntry {
    pub(crate) repository_type: StorageString,
    pub(crate) repository_url: StorageString,
    pub(crate) commit_hash: StorageString,
}

impl ProvenanceEntry {
    fn record(&self) -> (String, String, String) {
        (
            self.repository_type.get_string(),
            self.repository_url.get_string(),
            self.commit_hash.get_string(),
        )
    }
}

/// State of a [`ProvenanceHistory`] contract.
#[storage]
pub struct ProvenanceHistory {
    /// Published records, oldest first.
    pub(crate) entries: StorageVec<ProvenanceEntry>,
}

/// Interface of a contract exposing every provenance record it published.
pub trait IProvenanceHistory {
    /// The error type associated to the trait implementation.
    type Error: Into<alloc::vec::Vec<u8>>;

    /// Returns the number of published records.
    ///
    /// # Arguments
    ///
    /// * `&self` - Read access to the contract's state.
    #[must_use]
    fn provenance_count(&self) -> U256;

    /// Returns the record published at position `index`, the first
    /// deployment being at `0`.
    ///
    /// # Arguments
    ///
    /// * `&self` - Read access to the contract's state.
    /// * `index` - Position of the record in the history.
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfBounds`] - If `index` is not lower than
    ///   [`IProvenanceHistory::provenance_count`].
    fn provenance_at(
        &self,
        index: U256,
    ) -> Result<(String, String, String), Self::Error>;

    /// Solidity interface id of [`IProvenanceHistory`].
    #[must_use]
    fn interface_id() -> B32
    where
        Self: Sized,
    {
        let count = u32::from_be_bytes(function_selector!("provenanceCount"));
        let at = u32::from_be_bytes(function_selector!("provenanceAt", U256));
        B32::new((count ^ at).to_be_bytes())
    }
}

#[public]
#[implements(ISourceProvenance, IProvenanceHistory<Error = Error>, IErc165)]
impl ProvenanceHistory {}

#[public]
impl ISourceProvenance for ProvenanceHistory {
    fn provenance(&self) -> (String, String, String) {
        self.provenance()
    }
}

#[public]
impl IProvenanceHistory for ProvenanceHistory {
    type Error = Error;

    fn provenance_count(&self) -> U256 {
        self.provenance_count()
    }

    fn provenance_at(
        &self,
        index: U256,
    ) -> Result<(String, String, String), Self::Error> {
        self.provenance_at(index)
    }
}

impl ProvenanceHistory {
    /// Returns the latest record, or three empty strings if nothing was
    /// published yet.
    ///
    /// # Arguments
    ///
    /// * `&self` - Read access to the contract's state.
    #[must_use]
    pub fn provenance(&self) -> (String, String, String) {
        let len = self.entries.len();
        if len == 0 {
            return (String::new(), String::new(), String::new());
        }

        self.entries
            .get(len - 1)
            .map(|entry| entry.record())
            .unwrap_or_default()
    }

    /// Returns the number of published records.
    ///
    /// # Arguments
    ///
    /// * `&self` - Read access to the contract's state.
    #[must_use]
    pub fn provenance_count(&self) -> U256 {
        U256::from(self.entries.len())
    }

    /// Returns the record published at position `index`.
    ///
    /// # Arguments
    ///
    /// * `&self` - Read access to the contract's state.
    /// * `index` - Position of the record in the history.
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfBounds`] - If `index` is past the last record.
    pub fn provenance_at(
        &self,
        index: U256,
    ) -> Result<(String, String, String), Error> {
        let entry = usize::try_from(index)
            .ok()
            .and_then(|index| self.entries.get(index));

        match entry {
            Some(entry) => Ok(entry.record()),
            None => Err(Error::IndexOutOfBounds(ProvenanceIndexOutOfBounds {
                index,
                count: self.provenance_count(),
            })),
        }
    }

    /// Appends a new record, which becomes the current provenance.
    /// Internal function without access restriction.
    ///
    /// Returns the index of the new record.
    ///
    /// # Arguments
    ///
    /// * `&mut self` - Write access to the contract's state.
    /// * `repository_type` - Version control system, e.g. `git`.
    /// * `repository_url` - Clone URL of the repository, with its scheme.
    /// * `commit_hash` - Full commit hash of the source.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidRepositoryType`] - If `repository_type` is invalid.
    /// * [`Error::InvalidRepositoryUrl`] - If `repository_url` has no scheme.
    /// * [`Error::InvalidCommitHash`] - If `commit_hash` is not a full hash.
    ///
    /// # Events
    ///
    /// * [`ProvenanceUpdated`].
    pub fn _push(
        &mut self,
        repository_type: String,
        repository_url: String,
        commit_hash: String,
    ) -> Result<U256, Error> {
        check_record(&repository_type, &repository_url, &commit_hash)?;

        let index = self.provenance_count();
        let mut entry = self.entries.grow();
        entry.repository_type.set_str(&repository_type);
        entry.repository_url.set_str(&repository_url);
        entry.commit_hash.set_str(&commit_hash);

        evm::log(ProvenanceUpdated {
            index,
            repository_type,
            repository_url,
            commit_hash,
        });

        Ok(index)
    }
}

#[public]
impl IErc165 for ProvenanceHistory {
    fn supports_interface(&self, interface_id: B32) -> bool {
        <Self as ISourceProvenance>::interface_id() == interface_id
            || <Self as IProvenanceHistory>::interface_id() == interface_id
            || <Self as IErc165>::interface_id() == interface_id
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{keccak256, uint, Address};
    use motsu::prelude::*;
    use stylus_sdk::prelude::*;

    use super::*;

    const REPOSITORY_URL: &str = "https://github.com/example/contract";
    const FIRST_COMMIT: &str = "9fceb02d0ae598e95dc970b74767f19372d61af8";
    const SECOND_COMMIT: &str = "e83c5163316f89bfbde7d9ab23ca2e25604af290";

    unsafe impl TopLevelStorage for ProvenanceHistory {}

    fn push(
        contract: &Contract<ProvenanceHistory>,
        sender: Address,
        commit_hash: &str,
    ) -> Result<U256, Error> {
        contract.sender(sender)._push(
            "git".into(),
            REPOSITORY_URL.into(),
            commit_hash.into(),
        )
    }

    #[motsu::test]
    fn provenance_is_empty_before_first_push(
        contract: Contract<ProvenanceHistory>,
        alice: Address,
    ) {
        let (repository_type, repository_url, commit_hash) =
            contract.sender(alice).provenance();
        assert!(repository_type.is_empty());
        assert!(repository_url.is_empty());
        assert!(commit_hash.is_empty());
        assert_eq!(contract.sender(alice).provenance_count(), U256::ZERO);
    }

    #[motsu::test]
    fn push_appends_and_emits(
        contract: Contract<ProvenanceHistory>,
        alice: Address,
    ) {
        let index = push(&contract, alice, FIRST_COMMIT).motsu_unwrap();
        assert_eq!(index, U256::ZERO);

        contract.assert_emitted(&ProvenanceUpdated {
            index: U256::ZERO,
            repository_type: "git".into(),
            repository_url: REPOSITORY_URL.into(),
            commit_hash: FIRST_COMMIT.into(),
        });
        assert_eq!(contract.sender(alice).provenance_count(), uint!(1_U256));
    }

    #[motsu::test]
    fn provenance_returns_latest_record(
        contract: Contract<ProvenanceHistory>,
        alice: Address,
    ) {
        push(&contract, alice, FIRST_COMMIT).motsu_unwrap();
        let index = push(&contract, alice, SECOND_COMMIT).motsu_unwrap();
        assert_eq!(index, uint!(1_U256));

        let (_, _, commit_hash) = contract.sender(alice).provenance();
        assert_eq!(commit_hash, SECOND_COMMIT);
    }

    #[motsu::test]
    fn earlier_records_stay_unchanged(
        contract: Contract<ProvenanceHistory>,
        alice: Address,
    ) {
        push(&contract, alice, FIRST_COMMIT).motsu_unwrap();
        push(&contract, alice, SECOND_COMMIT).motsu_unwrap();

        let (repository_type, repository_url, commit_hash) = contract
            .sender(alice)
            .provenance_at(U256::ZERO)
            .motsu_expect("should return the first record");
        assert_eq!(repository_type, "git");
        assert_eq!(repository_url, REPOSITORY_URL);
        assert_eq!(commit_hash, FIRST_COMMIT);
    }

    #[motsu::test]
    fn provenance_at_reverts_when_out_of_bounds(
        contract: Contract<ProvenanceHistory>,
        alice: Address,
    ) {
        push(&contract, alice, FIRST_COMMIT).motsu_unwrap();

        let err = contract
            .sender(alice)
            .provenance_at(uint!(1_U256))
            .motsu_expect_err("should revert");
        assert!(matches!(
            err,
            Error::IndexOutOfBounds(ProvenanceIndexOutOfBounds { index, count })
                if index == uint!(1_U256) && count == uint!(1_U256)
        ));

        let err = contract
            .sender(alice)
            .provenance_at(U256::MAX)
            .motsu_expect_err("should revert");
        assert!(matches!(err, Error::IndexOutOfBounds(_)));
    }

    #[motsu::test]
    fn push_rejects_malformed_records(
        contract: Contract<ProvenanceHistory>,
        alice: Address,
    ) {
        let err = push(&contract, alice, "v1.0.0").motsu_unwrap_err();
        assert!(matches!(err, Error::InvalidCommitHash(_)));

        assert_eq!(contract.sender(alice).provenance_count(), U256::ZERO);
    }

    #[motsu::test]
    fn interface_id() {
        let count = keccak256("provenanceCount()");
        let at = keccak256("provenanceAt(uint256)");
        let expected: Vec<u8> =
            count[..4].iter().zip(&at[..4]).map(|(a, b)| a ^ b).collect();

        let actual = <ProvenanceHistory as IProvenanceHistory>::interface_id();
        assert_eq!(actual.as_slice(), expected.as_slice());
    }

    #[motsu::test]
    fn supports_interface(
        contract: Contract<ProvenanceHistory>,
        alice: Address,
    ) {
        assert!(contract.sender(alice).supports_interface(
            <ProvenanceHistory as ISourceProvenance>::interface_id()
        ));
        assert!(contract.sender(alice).supports_interface(
            <ProvenanceHistory as IProvenanceHistory>::interface_id()
        ));
        assert!(contract.sender(alice).supports_interface(
            <ProvenanceHistory as IErc165>::interface_id()
        ));

        let fake_interface_id: B32 = 0x12345678_u32.into();
        assert!(!contract.sender(alice).supports_interface(fake_interface_id));
    }
}
