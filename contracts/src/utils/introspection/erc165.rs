//! Trait of the ERC-165 standard, as defined in the [ERC].
//!
//! [ERC]: https://eips.ethereum.org/EIPS/eip-165

use alloy_primitives::aliases::B32;
use stylus_sdk::function_selector;

/// Interface of the ERC-165 standard, as defined in the [ERC].
///
/// Implementers can declare support of contract interfaces, which others can
/// query. A provenance-aware client calls
/// [`IErc165::supports_interface`] with
/// [`crate::provenance::ISourceProvenance::interface_id`] before reading the
/// record.
///
/// [ERC]: https://eips.ethereum.org/EIPS/eip-165
pub trait IErc165 {
    /// Returns true if this contract implements the interface defined by
    /// `interface_id`. See the corresponding [ERC] to learn more about how
    /// these ids are created.
    ///
    /// NOTE: Method [`IErc165::supports_interface`] should be reexported with
    /// `#[public]` macro manually, see the Example section.
    ///
    /// # Arguments
    ///
    /// * `&self` - Read access to the contract's state.
    /// * `interface_id` - The interface identifier, as specified in the [ERC].
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// #[public]
    /// impl IErc165 for SourceProvenanceExample {
    ///     fn supports_interface(&self, interface_id: B32) -> bool {
    ///         <Self as ISourceProvenance>::interface_id() == interface_id
    ///             || <Self as IErc165>::interface_id() == interface_id
    ///     }
    /// }
    /// ```
    ///
    /// [ERC]: https://eips.ethereum.org/EIPS/eip-165#how-interfaces-are-identified
    fn supports_interface(&self, interface_id: B32) -> bool;

    /// Solidity interface id of [`IErc165`], `0x01ffc9a7`.
    #[must_use]
    fn interface_id() -> B32
    where
        Self: Sized,
    {
        B32::new(function_selector!("supportsInterface", B32))
    }
}
