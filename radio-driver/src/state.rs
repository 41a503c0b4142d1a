/// States of the radio driver's finite state machine.
///
/// States exist explicitly so that every interrupt handler can check
/// "am I allowed to run here" before touching the transceiver or the
/// streaming cursor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum RadioState {
    NonInit,
    Init,
    Sleep,
    Idle,
    /// Awaiting sync word, either WOR-duty-cycled or continuous RX.
    Sniff,
    RxSync,
    RxPortionMiddle,
    RxPortionLast,
    RxFini,
    TxStarted,
    TxBusy,
    TxFini,
    CcaBusy,
    CcaFini,
    Err,
}
