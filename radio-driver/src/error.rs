/// Errors reported by the radio driver's public API.
///
/// `None`-as-success from the original callback-table design is
/// represented in Rust as `Ok(())`; this enum is only ever the `Err`
/// side of a `Result`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum RadioError {
    InvalidArgument,
    Busy,
    TxTimeout,
    TxNoPacket,
    BadFormat,
    BadCrc,
    ChannelAccessFailure,
    CmdUnsupported,
    InitFailed,
    Fatal,
}
