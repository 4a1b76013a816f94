/// One wire communication error type.
#[derive(Debug, thiserror::Error)]
pub enum OneWireError<E> {
    /// Encapsulates the error type from the underlying transport.
    #[error("bus transport error: {0}")]
    Other(E),
    /// Indicates that no device is present on the bus.
    #[error("no device present on bus")]
    NoDevicePresent,
    /// Presence was lost between two phases of a multi-step transaction,
    /// e.g. between the convert and read phases of a temperature reading.
    #[error("device lost during transaction")]
    DeviceLost,
    /// Indicates that a short circuit was detected on the bus.
    #[error("short circuit detected on bus")]
    ShortCircuit,
    /// Computed CRC of a ROM or of a data block is invalid.
    #[error("CRC-8 validation failed")]
    InvalidCrc,
}

impl<E> From<E> for OneWireError<E> {
    fn from(other: E) -> Self {
        Self::Other(other)
    }
}

impl<E> OneWireError<E> {
    /// Whether the error originates in the transport rather than on the bus.
    ///
    /// A transport error means the port itself could not be used, so no other
    /// device on the same bus can be reached either. Protocol and data errors
    /// only concern the device being addressed.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Other(_))
    }
}
