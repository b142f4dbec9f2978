//! Tool handlers, grouped by surface. Each handler decodes its argument
//! record, validates, executes against the kernel, publishes its events, and
//! returns (prose, state) for the envelope.

mod combat;
mod events;
mod world;

use serde::de::DeserializeOwned;
use serde_json::Value;

use contracts::KernelError;

/// Decode a handler's argument record; malformed input is a `Validation`
/// failure naming the tool.
pub(crate) fn decode_args<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T, KernelError> {
    serde_json::from_value(args.clone()).map_err(|err| {
        KernelError::with_details(
            contracts::ErrorKind::Validation,
            format!("invalid arguments for {tool}"),
            err.to_string(),
        )
    })
}
