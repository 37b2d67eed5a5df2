#![cfg_attr(not(test), no_main)]
extern crate alloc;

use alloc::{string::String, vec::Vec};

use alloy_primitives::aliases::B32;
use source_provenance::{
    provenance::{self, ISourceProvenance, Provenance},
    utils::introspection::erc165::IErc165,
};
use stylus_sdk::prelude::*;

#[entrypoint]
#[storage]
struct SourceProvenanceExample {
    provenance: Provenance,
}

#[public]
#[implements(ISourceProvenance, IErc165)]
impl SourceProvenanceExample {
    #[constructor]
    fn constructor(
        &mut self,
        repository_type: String,
        repository_url: String,
        commit_hash: String,
    ) -> Result<(), provenance::Error> {
        self.provenance.constructor(
            repository_type,
            repository_url,
            commit_hash,
        )
    }
}

#[public]
impl ISourceProvenance for SourceProvenanceExample {
    fn provenance(&self) -> (String, String, String) {
        self.provenance.provenance()
    }
}

#[public]
impl IErc165 for SourceProvenanceExample {
    fn supports_interface(&self, interface_id: B32) -> bool {
        <Self as ISourceProvenance>::interface_id() == interface_id
            || <Self as IErc165>::interface_id() == interface_id
    }
}
