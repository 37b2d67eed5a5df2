#![cfg_attr(not(test), no_main)]
extern crate alloc;

use alloc::{string::String, vec, vec::Vec};

use alloy_primitives::{aliases::B32, Address, U256};
use alloy_sol_macro::sol;
use source_provenance::{
    provenance::{
        self,
        history::{IProvenanceHistory, ProvenanceHistory},
        ISourceProvenance,
    },
    utils::introspection::erc165::IErc165,
};
use stylus_sdk::{msg, prelude::*, storage::StorageAddress};

sol! {
    #[derive(Debug)]
    #[allow(missing_docs)]
    error UnauthorizedPublisher(address account);
}

#[derive(SolidityError, Debug)]
enum Error {
    Provenance(provenance::Error),
    UnauthorizedPublisher(UnauthorizedPublisher),
}

impl From<provenance::Error> for Error {
    fn from(value: provenance::Error) -> Self {
        Error::Provenance(value)
    }
}

#[entrypoint]
#[storage]
struct UpgradeableProvenanceExample {
    history: ProvenanceHistory,
    publisher: StorageAddress,
}

#[public]
#[implements(
    ISourceProvenance,
    IProvenanceHistory<Error = provenance::Error>,
    IErc165
)]
impl UpgradeableProvenanceExample {
    #[constructor]
    fn constructor(
        &mut self,
        repository_type: String,
        repository_url: String,
        commit_hash: String,
    ) -> Result<(), Error> {
        self.publisher.set(msg::sender());
        self.history._push(repository_type, repository_url, commit_hash)?;
        Ok(())
    }

    fn publisher(&self) -> Address {
        self.publisher.get()
    }

    /// Publishes the provenance of the implementation the contract was just
    /// upgraded to.
    fn publish_provenance(
        &mut self,
        repository_type: String,
        repository_url: String,
        commit_hash: String,
    ) -> Result<U256, Error> {
        let account = msg::sender();
        if account != self.publisher.get() {
            return Err(Error::UnauthorizedPublisher(UnauthorizedPublisher {
                account,
            }));
        }

        Ok(self.history._push(repository_type, repository_url, commit_hash)?)
    }
}

#[public]
impl ISourceProvenance for UpgradeableProvenanceExample {
    fn provenance(&self) -> (String, String, String) {
        self.history.provenance()
    }
}

#[public]
impl IProvenanceHistory for UpgradeableProvenanceExample {
    type Error = provenance::Error;

    fn provenance_count(&self) -> U256 {
        self.history.provenance_count()
    }

    fn provenance_at(
        &self,
        index: U256,
    ) -> Result<(String, String, String), Self::Error> {
        self.history.provenance_at(index)
    }
}

#[public]
impl IErc165 for UpgradeableProvenanceExample {
    fn supports_interface(&self, interface_id: B32) -> bool {
        self.history.supports_interface(interface_id)
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::uint;
    use motsu::prelude::*;

    use super::*;

    const REPOSITORY_URL: &str = "https://github.com/example/contract";
    const FIRST_COMMIT: &str = "9fceb02d0ae598e95dc970b74767f19372d61af8";
    const SECOND_COMMIT: &str = "e83c5163316f89bfbde7d9ab23ca2e25604af290";

    fn deploy(
        contract: &Contract<UpgradeableProvenanceExample>,
        deployer: Address,
    ) {
        contract
            .sender(deployer)
            .constructor(
                "git".into(),
                REPOSITORY_URL.into(),
                FIRST_COMMIT.into(),
            )
            .motsu_unwrap();
    }

    #[motsu::test]
    fn deployer_becomes_publisher(
        contract: Contract<UpgradeableProvenanceExample>,
        alice: Address,
    ) {
        deploy(&contract, alice);

        assert_eq!(contract.sender(alice).publisher(), alice);
        assert_eq!(contract.sender(alice).provenance_count(), uint!(1_U256));
    }

    #[motsu::test]
    fn publisher_records_upgrades(
        contract: Contract<UpgradeableProvenanceExample>,
        alice: Address,
    ) {
        deploy(&contract, alice);

        let index = contract
            .sender(alice)
            .publish_provenance(
                "git".into(),
                REPOSITORY_URL.into(),
                SECOND_COMMIT.into(),
            )
            .motsu_unwrap();
        assert_eq!(index, uint!(1_U256));

        let (_, _, current) = contract.sender(alice).provenance();
        assert_eq!(current, SECOND_COMMIT);

        let (_, _, first) = contract
            .sender(alice)
            .provenance_at(U256::ZERO)
            .motsu_unwrap();
        assert_eq!(first, FIRST_COMMIT);
    }

    #[motsu::test]
    fn others_cannot_publish(
        contract: Contract<UpgradeableProvenanceExample>,
        alice: Address,
        bob: Address,
    ) {
        deploy(&contract, alice);

        let err = contract
            .sender(bob)
            .publish_provenance(
                "git".into(),
                REPOSITORY_URL.into(),
                SECOND_COMMIT.into(),
            )
            .motsu_unwrap_err();

        assert!(matches!(
            err,
            Error::UnauthorizedPublisher(UnauthorizedPublisher { account })
                if account == bob
        ));
        assert_eq!(contract.sender(bob).provenance_count(), uint!(1_U256));
    }

    #[motsu::test]
    fn advertises_history_interface(
        contract: Contract<UpgradeableProvenanceExample>,
        alice: Address,
    ) {
        assert!(contract.sender(alice).supports_interface(
            <UpgradeableProvenanceExample as IProvenanceHistory>::interface_id()
        ));
    }
}
