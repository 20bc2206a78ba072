use futures::stream::BoxStream;
use futures_util::StreamExt;
use tracing::info;

use crate::utils::GatewayError;

/// One message as delivered by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMessage {
    /// A published event, undecoded.
    Data(Vec<u8>),
    /// Bookkeeping traffic such as subscription acknowledgements.
    Control(String),
}

pub type BusStream = BoxStream<'static, Result<BusMessage, GatewayError>>;

/// Subscribes to `channel` on the redis server at `url`.
///
/// Any failure here means the service cannot do its job and should exit.
/// The returned stream ends when the redis connection is lost.
pub async fn subscribe(url: &str, channel: &str) -> Result<BusStream, GatewayError> {
    let client = redis::Client::open(url)?;
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    info!("Subscribed to bus channel: {channel}");

    let channel = channel.to_string();
    let stream = pubsub.into_on_message().map(move |msg| {
        if msg.get_channel_name() == channel {
            Ok(BusMessage::Data(msg.get_payload_bytes().to_vec()))
        } else {
            Ok(BusMessage::Control(format!(
                "message on unexpected channel {}",
                msg.get_channel_name()
            )))
        }
    });
    Ok(stream.boxed())
}
