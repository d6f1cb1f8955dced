//! Text emitters for the two halves of the bridge.
//!
//! Both render from the same [`WrappedMethod`](crate::context::WrappedMethod)
//! plan, so every `DllImport` in the surface names an export the shim
//! defines.

pub mod shim;
pub mod surface;

/// Name of the flat parameter carrying argument `i`.
pub(crate) fn param_name(i: usize) -> String {
    format!("id{i}")
}

/// Name of the native local holding argument `i`.
pub(crate) fn local_name(i: usize) -> String {
    format!("temp{i}")
}
