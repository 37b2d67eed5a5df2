/*!
# Source Provenance for Stylus

A library that lets a smart contract written for
[Arbitrum Stylus](https://docs.arbitrum.io/stylus/stylus-gentle-introduction)
declare where its source code lives and which exact version of that source
it was built from.

The accessor returns three strings: the repository type (e.g. `git`), the
repository URL and the full commit hash. Anyone can then fetch that commit,
rebuild it and compare the result with the deployed code.

## Usage

Add `source-provenance` to your `Cargo.toml` and embed one of the storage
components in your contract:

```ignore
use source_provenance::{
    provenance::{self, ISourceProvenance, Provenance},
    utils::introspection::erc165::IErc165,
};

#[entrypoint]
#[storage]
struct MyContract {
    provenance: Provenance,
}

#[public]
#[implements(ISourceProvenance, IErc165)]
impl MyContract {
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
```

Upgradeable contracts should use
[`ProvenanceHistory`](crate::provenance::history::ProvenanceHistory) instead,
which keeps every record ever published.
*/

#![allow(clippy::module_name_repetitions)]
#![cfg_attr(not(feature = "std"), no_std, no_main)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![deny(rustdoc::broken_intra_doc_links)]
extern crate alloc;

pub mod provenance;
pub mod utils;
