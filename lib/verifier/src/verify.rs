//! Verification pipeline: read, check, fetch, build, compare.
use std::fmt;

use alloy::primitives::Address;
use futures::{stream, StreamExt};
use serde::Serialize;

use crate::{
    builder::Builder,
    comparator::{Comparator, Comparison},
    error::{Error, Result},
    fetcher::Fetcher,
    reader::ChainReader,
    record::{FormatError, ProvenanceRecord},
};

/// Default number of verifications run at the same time.
pub const DEFAULT_MAX_PARALLEL: usize = 3;

/// Outcome of verifying one contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    /// The rebuilt code equals the deployed code.
    Match,
    /// The source was built, but the output differs from the deployed code.
    Mismatch(String),
    /// The source could not be fetched at the declared commit.
    FetchFailed(String),
    /// The source was fetched, but the build failed.
    BuildFailed(String),
    /// The record breaks a format rule, so nothing was fetched.
    Malformed(String),
}

impl Verdict {
    /// Returns true for [`Verdict::Match`].
    #[must_use]
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Match)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Match => f.write_str("MATCH"),
            Verdict::Mismatch(reason) => write!(f, "MISMATCH: {reason}"),
            Verdict::FetchFailed(reason) => write!(f, "FETCH FAILED: {reason}"),
            Verdict::BuildFailed(reason) => write!(f, "BUILD FAILED: {reason}"),
            Verdict::Malformed(reason) => write!(f, "MALFORMED: {reason}"),
        }
    }
}

/// How format problems of a record are handled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Policy {
    /// Format problems end the verification with [`Verdict::Malformed`].
    /// Otherwise they are reported and verification goes on.
    pub strict: bool,
    /// Branch and tag names a commit hash must not be equal to.
    pub known_refs: Vec<String>,
    /// Also lists the branches and tags of the declared repository.
    pub list_remote_refs: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self { strict: true, known_refs: Vec::new(), list_remote_refs: false }
    }
}

/// Result of verifying one contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Verified contract.
    pub address: Address,
    /// Record the contract declares.
    pub record: ProvenanceRecord,
    /// Outcome.
    pub verdict: Verdict,
    /// Format problems found in the record.
    pub problems: Vec<FormatError>,
}

/// Verifies that deployed contracts were built from the source they
/// declare.
#[derive(Clone, Debug)]
pub struct Verifier<R, F, B> {
    reader: R,
    fetcher: F,
    builder: B,
    comparator: Comparator,
    policy: Policy,
    max_parallel: usize,
}

impl<R, F, B> Verifier<R, F, B>
where
    R: ChainReader,
    F: Fetcher,
    B: Builder,
{
    /// Creates a verifier with the default [`Policy`] and [`Comparator`].
    pub fn new(reader: R, fetcher: F, builder: B) -> Self {
        Self {
            reader,
            fetcher,
            builder,
            comparator: Comparator::default(),
            policy: Policy::default(),
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }

    /// Sets the format policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the comparator.
    #[must_use]
    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Sets how many verifications [`Verifier::verify_many`] runs at the
    /// same time. Zero is treated as one.
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Returns the chain reader.
    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Verifies the contract at `address`.
    ///
    /// # Errors
    ///
    /// * [`Error::Rpc`] - If the record or the code can't be read.
    /// * [`Error::NoCode`] - If nothing is deployed at `address`.
    #[tracing::instrument(skip(self))]
    pub async fn verify(&self, address: Address) -> Result<Report> {
        let record = self.reader.provenance(address).await?;
        let code = self.reader.code(address).await?;
        if code.is_empty() {
            return Err(Error::NoCode(address));
        }
        tracing::info!(%record, code_len = code.len(), "read provenance");

        let (verdict, problems) = self.verify_record(&record, &code).await;
        tracing::info!(%verdict, "verified");

        Ok(Report { address, record, verdict, problems })
    }

    /// Verifies every address in `addresses`, running at most
    /// `max_parallel` verifications at the same time.
    ///
    /// Results are returned in the order of `addresses`. A failure of one
    /// verification does not affect the others.
    pub async fn verify_many(
        &self,
        addresses: &[Address],
    ) -> Vec<Result<Report>> {
        stream::iter(addresses.iter().copied())
            .map(|address| self.verify(address))
            .buffered(self.max_parallel)
            .collect()
            .await
    }

    /// Checks `record`, then fetches, builds and compares its source with
    /// `deployed`.
    ///
    /// Returns the verdict along with the format problems of the record.
    pub async fn verify_record(
        &self,
        record: &ProvenanceRecord,
        deployed: &[u8],
    ) -> (Verdict, Vec<FormatError>) {
        let problems = check_record(&self.fetcher, &self.policy, record).await;
        if !problems.is_empty() {
            if self.policy.strict {
                return (Verdict::Malformed(join(&problems)), problems);
            }
            for problem in &problems {
                tracing::warn!(%problem, "continuing despite format problem");
            }
        }

        let checkout = match self.fetcher.fetch(record).await {
            Ok(checkout) => checkout,
            Err(e) => return (Verdict::FetchFailed(e.to_string()), problems),
        };

        let artifact = match self.builder.build(&checkout).await {
            Ok(artifact) => artifact,
            Err(e) => return (Verdict::BuildFailed(e.to_string()), problems),
        };

        let verdict = match self.comparator.compare(deployed, &artifact.bytes) {
            Comparison::Equal => Verdict::Match,
            Comparison::Differs { reason, first_difference: Some(offset) } => {
                Verdict::Mismatch(format!(
                    "{reason}, first difference at byte {offset}"
                ))
            }
            Comparison::Differs { reason, first_difference: None } => {
                Verdict::Mismatch(reason)
            }
        };

        (verdict, problems)
    }
}

/// Runs the format checks of `record` under `policy`.
///
/// Local checks run first. Branch and tag names of the declared repository
/// are only listed when its type and URL passed them.
pub async fn check_record<F: Fetcher>(
    fetcher: &F,
    policy: &Policy,
    record: &ProvenanceRecord,
) -> Vec<FormatError> {
    let problems = record.check(&policy.known_refs);
    if !policy.list_remote_refs {
        return problems;
    }

    let locatable = !problems.iter().any(|problem| {
        matches!(
            problem,
            FormatError::RepositoryType(_) | FormatError::RepositoryUrl { .. }
        )
    });
    if !locatable {
        tracing::debug!("not listing remote refs of a malformed repository");
        return problems;
    }

    match fetcher.remote_refs(record).await {
        Ok(remote) => {
            let mut refs = policy.known_refs.clone();
            refs.extend(remote);
            record.check(&refs)
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not list remote refs");
            problems
        }
    }
}

fn join(problems: &[FormatError]) -> String {
    problems.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use alloy::primitives::{address, Bytes};

    use super::*;
    use crate::{builder::Artifact, fetcher::Checkout};

    const COMMIT: &str = "9fceb02d0ae598e95dc970b74767f19372d61af8";
    const URL: &str = "https://github.com/example/contract";
    const CODE: [u8; 4] = [0x60, 0x80, 0x60, 0x40];
    const ALICE: Address =
        address!("A11CEacF9aa32246d767FCCD72e02d6bCbcC375d");

    struct FakeReader {
        record: ProvenanceRecord,
        code: Vec<u8>,
    }

    impl ChainReader for FakeReader {
        async fn provenance(
            &self,
            _address: Address,
        ) -> Result<ProvenanceRecord> {
            Ok(self.record.clone())
        }

        async fn code(&self, _address: Address) -> Result<Bytes> {
            Ok(Bytes::from(self.code.clone()))
        }
    }

    struct FailingReader;

    impl ChainReader for FailingReader {
        async fn provenance(
            &self,
            _address: Address,
        ) -> Result<ProvenanceRecord> {
            Err(Error::Rpc("connection refused".into()))
        }

        async fn code(&self, _address: Address) -> Result<Bytes> {
            Err(Error::Rpc("connection refused".into()))
        }
    }

    #[derive(Default)]
    struct FakeFetcher {
        missing: bool,
        refs: Vec<String>,
        fetches: Arc<AtomicUsize>,
        listings: Arc<AtomicUsize>,
    }

    impl Fetcher for FakeFetcher {
        async fn fetch(&self, record: &ProvenanceRecord) -> Result<Checkout> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.missing {
                return Err(Error::CommitMismatch {
                    expected: record.commit_hash.clone(),
                    actual: String::new(),
                });
            }
            Ok(Checkout::new(tempfile::tempdir()?, record.commit_hash.clone()))
        }

        async fn remote_refs(
            &self,
            _record: &ProvenanceRecord,
        ) -> Result<Vec<String>> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            Ok(self.refs.clone())
        }
    }

    /// Records the highest number of fetches running at the same time.
    #[derive(Default)]
    struct SlowFetcher {
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Fetcher for SlowFetcher {
        async fn fetch(&self, record: &ProvenanceRecord) -> Result<Checkout> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Checkout::new(tempfile::tempdir()?, record.commit_hash.clone()))
        }
    }

    struct FakeBuilder(Option<Vec<u8>>);

    impl Builder for FakeBuilder {
        async fn build(&self, checkout: &Checkout) -> Result<Artifact> {
            let path = checkout.path().join("out.bin");
            match &self.0 {
                Some(bytes) => Ok(Artifact { path, bytes: bytes.clone() }),
                None => Err(Error::ArtifactNotFound(path)),
            }
        }
    }

    fn reader(commit_hash: &str) -> FakeReader {
        FakeReader {
            record: ProvenanceRecord::new("git", URL, commit_hash),
            code: CODE.to_vec(),
        }
    }

    fn same_code() -> FakeBuilder {
        FakeBuilder(Some(CODE.to_vec()))
    }

    #[tokio::test]
    async fn identical_build_matches() {
        let verifier =
            Verifier::new(reader(COMMIT), FakeFetcher::default(), same_code());

        let report = verifier.verify(ALICE).await.unwrap();
        assert_eq!(report.verdict, Verdict::Match);
        assert_eq!(report.address, ALICE);
        assert_eq!(report.record.commit_hash, COMMIT);
        assert!(report.problems.is_empty());
    }

    #[tokio::test]
    async fn differing_build_mismatches() {
        let verifier = Verifier::new(
            reader(COMMIT),
            FakeFetcher::default(),
            FakeBuilder(Some(vec![0x60, 0x80, 0x60, 0x41])),
        );

        let report = verifier.verify(ALICE).await.unwrap();
        let Verdict::Mismatch(reason) = report.verdict else {
            panic!("should mismatch");
        };
        assert!(reason.contains("first difference at byte 3"), "{reason}");
    }

    #[tokio::test]
    async fn missing_commit_fails_fetch() {
        let fetcher = FakeFetcher { missing: true, ..FakeFetcher::default() };
        let verifier = Verifier::new(reader(COMMIT), fetcher, same_code());

        let report = verifier.verify(ALICE).await.unwrap();
        assert!(matches!(report.verdict, Verdict::FetchFailed(_)));
    }

    #[tokio::test]
    async fn failing_build_is_reported() {
        let verifier = Verifier::new(
            reader(COMMIT),
            FakeFetcher::default(),
            FakeBuilder(None),
        );

        let report = verifier.verify(ALICE).await.unwrap();
        assert!(matches!(report.verdict, Verdict::BuildFailed(_)));
    }

    #[tokio::test]
    async fn malformed_record_is_not_fetched() {
        let fetcher = FakeFetcher::default();
        let fetches = Arc::clone(&fetcher.fetches);
        let verifier = Verifier::new(reader("main"), fetcher, same_code());

        let report = verifier.verify(ALICE).await.unwrap();
        assert!(matches!(report.verdict, Verdict::Malformed(_)));
        assert_eq!(
            report.problems,
            vec![FormatError::CommitHash("main".into())]
        );
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn remote_branch_named_like_the_hash_is_malformed() {
        let fetcher = FakeFetcher {
            refs: vec![COMMIT.to_owned()],
            ..FakeFetcher::default()
        };
        let policy = Policy { list_remote_refs: true, ..Policy::default() };
        let verifier = Verifier::new(reader(COMMIT), fetcher, same_code())
            .with_policy(policy);

        let report = verifier.verify(ALICE).await.unwrap();
        assert!(matches!(report.verdict, Verdict::Malformed(_)));
        assert_eq!(
            report.problems,
            vec![FormatError::SymbolicRef(COMMIT.into())]
        );
    }

    #[tokio::test]
    async fn malformed_url_is_never_listed_remotely() {
        let record = ProvenanceRecord::new(
            "git",
            "--upload-pack=touch /tmp/listed;:",
            COMMIT,
        );

        for strict in [true, false] {
            let fetcher = FakeFetcher::default();
            let listings = Arc::clone(&fetcher.listings);
            let policy =
                Policy { strict, list_remote_refs: true, ..Policy::default() };

            let problems = check_record(&fetcher, &policy, &record).await;

            assert!(matches!(
                problems.as_slice(),
                [FormatError::RepositoryUrl { .. }]
            ));
            assert_eq!(listings.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn well_formed_url_is_listed_remotely() {
        let fetcher = FakeFetcher::default();
        let listings = Arc::clone(&fetcher.listings);
        let policy = Policy { list_remote_refs: true, ..Policy::default() };
        let record = ProvenanceRecord::new("git", URL, COMMIT);

        let problems = check_record(&fetcher, &policy, &record).await;

        assert!(problems.is_empty());
        assert_eq!(listings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lenient_policy_reports_problems_and_goes_on() {
        let policy = Policy {
            strict: false,
            known_refs: vec![format!("refs/tags/{COMMIT}")],
            ..Policy::default()
        };
        let verifier =
            Verifier::new(reader(COMMIT), FakeFetcher::default(), same_code())
                .with_policy(policy);

        let report = verifier.verify(ALICE).await.unwrap();
        assert_eq!(report.verdict, Verdict::Match);
        assert_eq!(report.problems.len(), 1);
    }

    #[tokio::test]
    async fn empty_code_is_an_error() {
        let reader = FakeReader { code: Vec::new(), ..reader(COMMIT) };
        let verifier =
            Verifier::new(reader, FakeFetcher::default(), same_code());

        let err = verifier.verify(ALICE).await.unwrap_err();
        assert!(matches!(err, Error::NoCode(a) if a == ALICE));
    }

    #[tokio::test]
    async fn verify_many_keeps_order_and_isolates_failures() {
        let verifier =
            Verifier::new(FailingReader, FakeFetcher::default(), same_code())
                .with_max_parallel(0);

        let results = verifier.verify_many(&[ALICE, Address::ZERO]).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| matches!(r, Err(Error::Rpc(_)))));

        let verifier =
            Verifier::new(reader(COMMIT), FakeFetcher::default(), same_code());
        let results = verifier.verify_many(&[ALICE, Address::ZERO]).await;
        let addresses: Vec<_> =
            results.into_iter().map(|r| r.unwrap().address).collect();
        assert_eq!(addresses, vec![ALICE, Address::ZERO]);
    }

    #[tokio::test]
    async fn verify_many_runs_at_most_max_parallel_at_once() {
        let fetcher = SlowFetcher::default();
        let peak = Arc::clone(&fetcher.peak);
        let in_flight = Arc::clone(&fetcher.in_flight);
        let verifier = Verifier::new(reader(COMMIT), fetcher, same_code())
            .with_max_parallel(2);
        let addresses: Vec<Address> =
            (1..=5u8).map(Address::with_last_byte).collect();

        let results = verifier.verify_many(&addresses).await;

        assert_eq!(results.len(), 5);
        assert!(results
            .iter()
            .all(|r| matches!(r, Ok(report) if report.verdict.is_match())));
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn verdict_serializes_with_reason() {
        let json =
            serde_json::to_value(Verdict::FetchFailed("gone".into())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "verdict": "fetch_failed", "reason": "gone" })
        );

        let json = serde_json::to_value(Verdict::Match).unwrap();
        assert_eq!(json, serde_json::json!({ "verdict": "match" }));
    }
}
