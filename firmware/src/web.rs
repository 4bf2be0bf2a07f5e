use embassy_net::tcp::TcpSocket;
use embassy_net::Stack;
use log::{info, warn};
use readerplayer::web::serve_connection;
use readerplayer::PlayerControl;

pub const PORT: u16 = 80;

/// Accepts one connection at a time and forwards its command to the player.
pub async fn serve<P: PlayerControl>(stack: Stack<'_>, mut player: P) {
    let mut tcp_rx_buffer = [0; 1024];
    let mut tcp_tx_buffer = [0; 2048];
    let mut http_buffer = [0; 1024];

    info!("Web server listening on port {}", PORT);
    loop {
        let mut socket = TcpSocket::new(stack, &mut tcp_rx_buffer, &mut tcp_tx_buffer);
        if let Err(err) = socket.accept(PORT).await {
            warn!("Failed to accept connection: {:?}", err);
            continue;
        }

        if let Err(err) = serve_connection(&mut socket, &mut player, &mut http_buffer).await {
            warn!("Failed to serve request: {:?}", err);
        }

        socket.close();
        if let Err(err) = socket.flush().await {
            warn!("Failed to close connection: {:?}", err);
        }
    }
}
