//! The per-controller subcommand request/reply engine.
//!
//! Keeps at most one outstanding request per controller, matches replies
//! against the echoed opcode (and echoed SPI address/length), and applies
//! the minimum inter-subcommand spacing plus timeout and bounded retry.
//! Which controller may talk at all is the scheduler's decision, not ours.

use crate::monitor::Config;
use crate::{Controller, Transport};
use joycon_wire::input::SubcommandReply;
use joycon_wire::{SubcommandId, SubcommandRequest};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// What the reply must echo back for the request to be considered answered.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ReplyTag {
    Opcode(SubcommandId),
    SpiRead { addr: u32, len: u8 },
}

impl ReplyTag {
    fn matches(&self, reply: &SubcommandReply) -> bool {
        match *self {
            ReplyTag::Opcode(opcode) => reply.opcode == opcode,
            ReplyTag::SpiRead { addr, len } => match reply.spi_result() {
                Some(Ok(spi)) => spi.addr == addr && spi.len == len,
                _ => false,
            },
        }
    }
}

/// Which step of the initialization sequence issued the request; resumed by
/// the manager when the request completes or exhausts its retries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SubcommandPurpose {
    Prime,
    QueryDeviceInfo,
    ReadStickCalibration,
    SetReportMode,
}

#[derive(Debug)]
struct PendingSubcommand {
    request: SubcommandRequest,
    tag: ReplyTag,
    purpose: SubcommandPurpose,
    sent_at: Instant,
    attempts_remaining: u8,
}

#[derive(Debug)]
struct DeferredSubcommand {
    request: SubcommandRequest,
    tag: ReplyTag,
    purpose: SubcommandPurpose,
    send_at: Instant,
    attempts_remaining: u8,
}

/// Engine state embedded in each [`Controller`]. At most one of the two
/// slots is occupied.
#[derive(Debug, Default)]
pub(crate) struct SubcommandSlot {
    pending: Option<PendingSubcommand>,
    deferred: Option<DeferredSubcommand>,
}

impl SubcommandSlot {
    pub(crate) fn is_idle(&self) -> bool {
        self.pending.is_none() && self.deferred.is_none()
    }
}

/// A request that ran out of retries.
pub(crate) struct ExhaustedSubcommand {
    pub purpose: SubcommandPurpose,
    pub opcode: SubcommandId,
    pub attempts: u8,
}

impl Controller {
    /// Queues `request` for sending. Sends immediately unless the minimum
    /// inter-subcommand interval has not yet elapsed, in which case the send
    /// is deferred until it has (sending too fast risks transport-level
    /// disconnects).
    pub(crate) fn submit_subcommand(
        &mut self,
        transport: &mut dyn Transport,
        now: Instant,
        request: SubcommandRequest,
        tag: ReplyTag,
        purpose: SubcommandPurpose,
        config: &Config,
    ) -> anyhow::Result<()> {
        assert!(
            self.slot.is_idle(),
            "{}: second subcommand while one is outstanding",
            self.handle
        );
        let attempts_remaining = config.max_attempts.saturating_sub(1);
        match self.earliest_send(now, config) {
            Some(send_at) => {
                trace!(handle = %self.handle, opcode = ?request.opcode, delay = ?(send_at - now),
                       "subcommand deferred by rate limit");
                self.slot.deferred = Some(DeferredSubcommand {
                    request,
                    tag,
                    purpose,
                    send_at,
                    attempts_remaining,
                });
                Ok(())
            }
            None => self.dispatch(transport, now, request, tag, purpose, attempts_remaining),
        }
    }

    /// `Some(instant)` when the rate limit forbids sending before then.
    fn earliest_send(&self, now: Instant, config: &Config) -> Option<Instant> {
        let last = self.last_subcmd_sent_at?;
        let earliest = last + config.min_subcmd_interval;
        if earliest > now {
            Some(earliest)
        } else {
            None
        }
    }

    fn dispatch(
        &mut self,
        transport: &mut dyn Transport,
        now: Instant,
        request: SubcommandRequest,
        tag: ReplyTag,
        purpose: SubcommandPurpose,
        attempts_remaining: u8,
    ) -> anyhow::Result<()> {
        let report = request.encode(self.next_counter());
        trace!(handle = %self.handle, out_report = %hex::encode(&report[..]));
        transport.write(self.handle, &report)?;
        self.last_subcmd_sent_at = Some(now);
        self.slot.pending = Some(PendingSubcommand {
            request,
            tag,
            purpose,
            sent_at: now,
            attempts_remaining,
        });
        Ok(())
    }

    /// Routes an inbound subcommand reply. Returns the completed request's
    /// purpose when the reply matches; unmatched replies are dropped (they
    /// belong to no outstanding request).
    pub(crate) fn handle_subcmd_reply(
        &mut self,
        reply: &SubcommandReply,
    ) -> Option<(SubcommandPurpose, SubcommandReply)> {
        match &self.slot.pending {
            Some(pending) if pending.tag.matches(reply) => {
                let pending = self.slot.pending.take().expect("just matched");
                trace!(handle = %self.handle, opcode = ?reply.opcode, "subcommand reply matched");
                Some((pending.purpose, reply.clone()))
            }
            _ => {
                debug!(handle = %self.handle, opcode = ?reply.opcode, "unexpected reply, dropped");
                None
            }
        }
    }

    /// Fires deferred sends and timeouts that are due. Returns the request
    /// that exhausted its retry budget, if any.
    pub(crate) fn poll_engine(
        &mut self,
        transport: &mut dyn Transport,
        now: Instant,
        config: &Config,
    ) -> anyhow::Result<Option<ExhaustedSubcommand>> {
        if let Some(deferred) = self.slot.deferred.take() {
            if deferred.send_at <= now {
                self.dispatch(
                    transport,
                    now,
                    deferred.request,
                    deferred.tag,
                    deferred.purpose,
                    deferred.attempts_remaining,
                )?;
            } else {
                self.slot.deferred = Some(deferred);
            }
        }

        let timed_out = match &self.slot.pending {
            Some(pending) => pending.sent_at + config.subcmd_timeout <= now,
            None => false,
        };
        if !timed_out {
            return Ok(None);
        }

        let pending = self.slot.pending.take().expect("checked above");
        if pending.attempts_remaining > 0 {
            warn!(handle = %self.handle, opcode = ?pending.request.opcode,
                  remaining = pending.attempts_remaining, "subcommand timeout, resending");
            self.dispatch(
                transport,
                now,
                pending.request,
                pending.tag,
                pending.purpose,
                pending.attempts_remaining - 1,
            )?;
            Ok(None)
        } else {
            warn!(handle = %self.handle, opcode = ?pending.request.opcode,
                  attempts = config.max_attempts, "subcommand retries exhausted");
            Ok(Some(ExhaustedSubcommand {
                purpose: pending.purpose,
                opcode: pending.request.opcode,
                attempts: config.max_attempts,
            }))
        }
    }

    /// Next instant at which [`poll_engine`](Self::poll_engine) has work.
    pub(crate) fn engine_deadline(&self, config: &Config) -> Option<Instant> {
        let deferred = self.slot.deferred.as_ref().map(|d| d.send_at);
        let timeout = self
            .slot
            .pending
            .as_ref()
            .map(|p| p.sent_at + config.subcmd_timeout);
        match (deferred, timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
