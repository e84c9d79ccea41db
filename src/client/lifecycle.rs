use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use super::{connection::ConnectionState, drain::ShutdownToken};
use crate::transport::{EventReceiver, TransportEvent};

/// Единственный потребитель событий жизненного цикла соединения.
///
/// Завершается после `Closed` (обрабатывается не более одного раза) или
/// когда транспорт закрывает канал событий.
pub(crate) async fn run(
    client_id: String,
    mut events: EventReceiver,
    state: Arc<watch::Sender<ConnectionState>>,
    shutdown: ShutdownToken,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Reconnected => {
                info!(%client_id, "Bus reconnect event");
                transition(&state, ConnectionState::Disconnected, ConnectionState::Connected);
            }
            TransportEvent::Disconnected { error: Some(reason) } => {
                error!(%client_id, error = %reason, "Bus disconnected with error");
                transition(&state, ConnectionState::Connected, ConnectionState::Disconnected);
            }
            TransportEvent::Disconnected { error: None } => {
                info!(%client_id, "Bus disconnected");
                transition(&state, ConnectionState::Connected, ConnectionState::Disconnected);
            }
            TransportEvent::Error { subject, reason } => {
                error!(
                    %client_id,
                    subject = subject.as_deref().unwrap_or(""),
                    error = %reason,
                    "Bus async error"
                );
            }
            TransportEvent::Closed => {
                info!(%client_id, "Bus connection closed");
                state.send_replace(ConnectionState::Closed);
                shutdown.release();
                return;
            }
        }
    }
    debug!(%client_id, "Lifecycle channel closed");
}

/// Меняет состояние только из ожидаемого `from`; `Draining` и `Closed`
/// таким образом никогда не перезаписываются.
fn transition(
    state: &watch::Sender<ConnectionState>,
    from: ConnectionState,
    to: ConnectionState,
) -> bool {
    state.send_if_modified(|current| {
        if *current == from {
            *current = to;
            true
        } else {
            false
        }
    })
}
