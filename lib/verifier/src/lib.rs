/*!
# Provenance Verifier

Checks that a deployed contract was built from the source it declares
through `provenance()`.

For each contract the verifier reads the `(repositoryType, repositoryUrl,
commitHash)` record, checks its format, fetches the declared commit, builds
it and compares the result with the code deployed on-chain. Stylus programs
are decompressed before comparison, and regions that legitimately differ
between builds (wasm custom sections, solc metadata, immutables) are ignored.

```ignore
use provenance_verifier::{Config, RpcReader, Verifier};

let config = Config::load("verifier.toml")?;
let reader = RpcReader::connect("http://localhost:8547".parse()?);
let verifier = Verifier::new(reader, config.fetcher(), config.builder())
    .with_policy(config.policy())
    .with_comparator(config.comparator());

let report = verifier.verify(address).await?;
println!("{}", report.verdict);
```
*/
#![allow(clippy::module_name_repetitions)]
#![deny(rustdoc::broken_intra_doc_links)]

mod error;
mod process;

pub mod builder;
pub mod comparator;
pub mod config;
pub mod fetcher;
pub mod reader;
pub mod record;
pub mod verify;
pub mod wasm;

pub use builder::{Artifact, Builder, CommandBuilder};
pub use comparator::{Comparator, Comparison, ImmutableRange};
pub use config::Config;
pub use error::{Error, Result};
pub use fetcher::{Checkout, Fetcher, GitFetcher};
pub use reader::{ChainReader, RpcReader};
pub use record::{FormatError, ProvenanceRecord};
pub use verify::{check_record, Policy, Report, Verdict, Verifier};
