/// Tag identifying one channel instance opened by a connection manager.
///
/// Incremented every time a new channel is started; events carrying an
/// older generation belong to a superseded channel and are discarded.
pub type Generation = u64;
