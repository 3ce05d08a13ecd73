use actix::prelude::*;
use tracing::{debug, info, warn};

use crate::relay::{ClientEvent, ConnectionId, EventSender, RelayService, RelayStats};

/// A new transport connection and the channel its events are written to.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub id: ConnectionId,
    pub sender: EventSender,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub id: ConnectionId,
}

/// A decoded client event. Fire-and-forget: the hub never replies.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Inbound {
    pub id: ConnectionId,
    pub event: ClientEvent,
}

#[derive(Message)]
#[rtype(result = "RelayStats")]
pub struct GetStats;

/// Serializes every state change of the relay onto one actor mailbox.
pub struct RelayHub {
    relay: RelayService,
}

impl RelayHub {
    pub fn new(relay: RelayService) -> Self {
        Self { relay }
    }
}

impl Actor for RelayHub {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("Relay hub started");
    }
}

impl Handler<Connect> for RelayHub {
    type Result = ();

    fn handle(&mut self, msg: Connect, _ctx: &mut Self::Context) {
        self.relay.connect(msg.id, msg.sender);
    }
}

impl Handler<Disconnect> for RelayHub {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _ctx: &mut Self::Context) {
        let report = self.relay.disconnect(msg.id);
        match report.user {
            Some(user) => info!("Connection {} for user {} closed", msg.id, user),
            None => info!("Unregistered connection {} closed", msg.id),
        }
    }
}

impl Handler<Inbound> for RelayHub {
    type Result = ();

    fn handle(&mut self, msg: Inbound, _ctx: &mut Self::Context) {
        let name = msg.event.name();
        match self.relay.handle(msg.id, msg.event) {
            Ok(outcome) => debug!("{} on connection {}: {:?}", name, msg.id, outcome),
            Err(e) => warn!("Dropped event on connection {}: {}", msg.id, e),
        }
    }
}

impl Handler<GetStats> for RelayHub {
    type Result = MessageResult<GetStats>;

    fn handle(&mut self, _msg: GetStats, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.relay.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::relay::{RegisterPayload, ServerEvent};
    use tokio::sync::mpsc;

    #[actix_rt::test]
    async fn test_hub_applies_events_in_order() {
        let hub = RelayHub::new(RelayService::new(RelayConfig::default())).start();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();

        hub.do_send(Connect { id: c1, sender: tx1 });
        hub.do_send(Connect { id: c2, sender: tx2 });
        for (id, user) in [(c1, "u1"), (c2, "u2")] {
            hub.do_send(Inbound {
                id,
                event: ClientEvent::RegisterUser(RegisterPayload::Bare(user.into())),
            });
            hub.do_send(Inbound {
                id,
                event: ClientEvent::JoinPeerGroup {
                    group_id: "peer1".into(),
                    user_id: user.into(),
                    user_name: None,
                },
            });
        }

        let stats = hub.send(GetStats).await.unwrap();
        assert_eq!(stats, RelayStats { users: 2, groups: 1 });

        hub.do_send(Disconnect { id: c1 });
        let stats = hub.send(GetStats).await.unwrap();
        assert_eq!(stats.users, 1);

        match rx2.recv().await {
            Some(ServerEvent::UserLeftGroup { user_id, .. }) => assert_eq!(user_id, "u1"),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
