use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, instrument};

use crate::config::{ClientConfig, TransportConfig};
use crate::core::codec::MessageCodec;
use crate::error::Result;
use crate::utils::timeout::with_timeout_error;

/// Codec matching the framing settings of `config`
pub fn codec_for(config: &TransportConfig) -> MessageCodec {
    MessageCodec::new(config.format, config.max_payload_size)
}

/// Connect to the topology server within the configured deadline
#[instrument(skip(client, transport), fields(address = %client.address))]
pub async fn connect(
    client: &ClientConfig,
    transport: &TransportConfig,
) -> Result<Framed<TcpStream, MessageCodec>> {
    let stream = with_timeout_error(
        async { Ok(TcpStream::connect(&client.address).await?) },
        client.connection_timeout,
    )
    .await?;

    stream.set_nodelay(true)?;
    debug!(peer = ?stream.peer_addr().ok(), "Connected");

    Ok(Framed::new(stream, codec_for(transport)))
}
