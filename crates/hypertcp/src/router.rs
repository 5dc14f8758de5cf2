//! Dispatch of JSON envelopes to a device, to every authenticated
//! connection, or to the server itself.

use log::warn;

use crate::envelope::Envelope;
use crate::outbound::OutboundFrame;
use crate::registry::Registry;

const TARGET_BROADCAST: &str = "broadcast";
const TARGET_SERVER: &str = "server";

/// The wire header's `PayloadLen` field is a `u16`; a stamped envelope that
/// grew past this after `stamp_sender` appended `from` can't be framed at
/// all, not just truncated, since truncating a JSON document mid-stream
/// would hand the recipient an unparsable frame body with a payload length
/// too small for the bytes that actually follow it.
const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Route `envelope` from `sender_device_id` to `target_id`.
///
/// - `target_id == "broadcast"` delegates to [`broadcast`].
/// - `target_id == "server"` is handled internally: this core has no
///   server-side commands defined yet, so it is a no-op, logged for
///   visibility and left open for extension.
/// - Otherwise, the device group for `target_id` is looked up. A miss is
///   logged and dropped; the sender still gets its normal RESPONSE ack —
///   routing misses are never surfaced to the sender as an error.
///
/// Delivery is best-effort: a write failure to one recipient tears that
/// recipient down but never aborts delivery to the others. The recipient
/// list is snapshotted under the registry lock before any write happens.
pub fn route(registry: &Registry, sender_device_id: &str, target_id: &str, mut envelope: Envelope) {
    envelope.stamp_sender(sender_device_id);

    match target_id {
        TARGET_BROADCAST => deliver_broadcast(registry, envelope),
        TARGET_SERVER => handle_server_message(sender_device_id, &envelope),
        _ => {
            let recipients = registry.lookup_device(target_id);
            if recipients.is_empty() {
                warn!("route: target device not found: {target_id}");
                return;
            }
            deliver(registry, recipients, &envelope);
        }
    }
}

/// Broadcast `envelope` to every authenticated connection, admins included.
/// The sender is not excluded from delivery; see `DESIGN.md` for why.
pub fn broadcast(registry: &Registry, sender_device_id: &str, mut envelope: Envelope) {
    envelope.stamp_sender(sender_device_id);
    deliver_broadcast(registry, envelope);
}

fn deliver_broadcast(registry: &Registry, envelope: Envelope) {
    let recipients = registry.snapshot_broadcast_recipients();
    deliver(registry, recipients, &envelope);
}

fn handle_server_message(sender_device_id: &str, envelope: &Envelope) {
    log::info!("server received message from {sender_device_id}: {:?}", envelope.payload);
}

fn deliver(registry: &Registry, recipients: Vec<(crate::registry::ConnectionId, crate::outbound::Mailbox)>, envelope: &Envelope) {
    let payload = envelope.to_bytes();
    if payload.len() > MAX_PAYLOAD_LEN {
        warn!(
            "route: stamped envelope is {} bytes, over the {}-byte PayloadLen ceiling; dropping delivery to {} recipient(s)",
            payload.len(),
            MAX_PAYLOAD_LEN,
            recipients.len()
        );
        return;
    }

    let frame = OutboundFrame::new(crate::framing::FrameType::JsonMessage.as_u8(), 0, payload);

    for (id, mailbox) in recipients {
        if mailbox.send(frame.clone()).is_err() {
            warn!("route: recipient {id} mailbox closed, tearing down");
            registry.deregister(id);
        }
    }
}
