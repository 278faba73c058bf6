use futures::stream::BoxStream;

use super::TransportEvent;

pub struct TransportEventStream(pub BoxStream<'static, TransportEvent>);

impl core::ops::Deref for TransportEventStream {
    type Target = BoxStream<'static, TransportEvent>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for TransportEventStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
