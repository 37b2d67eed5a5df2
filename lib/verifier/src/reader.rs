//! Reads provenance records and deployed code from a node.
use std::future::Future;

use alloy::{
    primitives::{Address, Bytes, FixedBytes, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    sol,
};
use source_provenance::provenance::{
    history::{IProvenanceHistory, ProvenanceHistory},
    ISourceProvenance, Provenance,
};
use url::Url;

use crate::{
    error::{Error, Result},
    record::ProvenanceRecord,
};

sol!(
    #[sol(rpc)]
    contract SourceProvenance {
        function provenance()
            external
            view
            returns (
                string repositoryType,
                string repositoryUrl,
                string commitHash
            );
        function supportsInterface(bytes4 interfaceId)
            external
            view
            returns (bool);

        function provenanceCount() external view returns (uint256);
        function provenanceAt(uint256 index)
            external
            view
            returns (
                string repositoryType,
                string repositoryUrl,
                string commitHash
            );
    }
);

/// Highest number of records [`RpcReader::history`] reads.
pub const MAX_HISTORY_LEN: usize = 1024;

/// ERC-165 id of the `provenance()` interface.
#[must_use]
pub fn provenance_interface_id() -> [u8; 4] {
    <Provenance as ISourceProvenance>::interface_id().0
}

/// ERC-165 id of the `provenanceCount()`/`provenanceAt(uint256)` interface.
#[must_use]
pub fn history_interface_id() -> [u8; 4] {
    <ProvenanceHistory as IProvenanceHistory>::interface_id().0
}

/// Read access to the chain a contract lives on.
pub trait ChainReader {
    /// Calls `provenance()` on `address`.
    fn provenance(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<ProvenanceRecord>> + Send;

    /// Returns the code deployed at `address`, empty if there is none.
    fn code(&self, address: Address)
        -> impl Future<Output = Result<Bytes>> + Send;
}

/// [`ChainReader`] backed by a JSON-RPC provider.
#[derive(Clone)]
pub struct RpcReader {
    provider: DynProvider,
}

impl RpcReader {
    /// Connects to the node at `rpc_url` over HTTP.
    #[must_use]
    pub fn connect(rpc_url: Url) -> Self {
        let provider = ProviderBuilder::new().connect_http(rpc_url).erased();
        Self { provider }
    }

    /// Wraps an existing provider.
    #[must_use]
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }

    /// Returns true if `address` advertises `interface_id` through ERC-165.
    ///
    /// A reverting call, or one returning no or undecodable data, is
    /// reported as not supported.
    ///
    /// # Errors
    ///
    /// * [`Error::Rpc`] - If the node can't be reached or fails the request.
    pub async fn supports_interface(
        &self,
        address: Address,
        interface_id: [u8; 4],
    ) -> Result<bool> {
        let contract = SourceProvenance::new(address, &self.provider);
        let call = contract.supportsInterface(FixedBytes(interface_id));
        match call.call().await {
            Ok(supported) => Ok(supported),
            Err(e) if is_revert(&e) => {
                tracing::debug!(%address, error = %e, "not supported");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns true if `address` advertises `provenance()`.
    ///
    /// # Errors
    ///
    /// See [`RpcReader::supports_interface`].
    pub async fn supports_provenance(&self, address: Address) -> Result<bool> {
        self.supports_interface(address, provenance_interface_id()).await
    }

    /// Returns true if `address` advertises its provenance history.
    ///
    /// # Errors
    ///
    /// See [`RpcReader::supports_interface`].
    pub async fn supports_history(&self, address: Address) -> Result<bool> {
        self.supports_interface(address, history_interface_id()).await
    }

    /// Reads every record of a contract keeping its provenance history,
    /// oldest first.
    ///
    /// # Errors
    ///
    /// * [`Error::Rpc`] - If a call fails.
    /// * [`Error::HistoryTooLong`] - If `provenanceCount()` exceeds
    ///   [`MAX_HISTORY_LEN`].
    pub async fn history(
        &self,
        address: Address,
    ) -> Result<Vec<ProvenanceRecord>> {
        let contract = SourceProvenance::new(address, &self.provider);
        let len = history_len(contract.provenanceCount().call().await?)?;

        let mut records = Vec::with_capacity(len);
        for index in 0..len {
            let entry = contract.provenanceAt(U256::from(index)).call().await?;
            records.push(ProvenanceRecord::new(
                entry.repositoryType,
                entry.repositoryUrl,
                entry.commitHash,
            ));
        }

        Ok(records)
    }
}

fn history_len(count: U256) -> Result<usize> {
    usize::try_from(count)
        .ok()
        .filter(|len| *len <= MAX_HISTORY_LEN)
        .ok_or(Error::HistoryTooLong { count, max: MAX_HISTORY_LEN })
}

/// Returns true if `err` was raised by the called contract rather than by
/// the node or the transport.
fn is_revert(err: &alloy::contract::Error) -> bool {
    use alloy::contract::Error as CallError;

    match err {
        CallError::TransportError(e) => e
            .as_error_resp()
            .is_some_and(|payload| {
                payload.code == 3 || payload.message.contains("revert")
            }),
        CallError::ZeroData(..) | CallError::AbiError(_) => true,
        _ => false,
    }
}

impl ChainReader for RpcReader {
    #[tracing::instrument(skip(self))]
    async fn provenance(&self, address: Address) -> Result<ProvenanceRecord> {
        let contract = SourceProvenance::new(address, &self.provider);
        let record = contract.provenance().call().await?;
        Ok(ProvenanceRecord::new(
            record.repositoryType,
            record.repositoryUrl,
            record.commitHash,
        ))
    }

    async fn code(&self, address: Address) -> Result<Bytes> {
        Ok(self.provider.get_code_at(address).await?)
    }
}
