/* This file is part of fromage
 *
 * Copyright (C) 2020-2026 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Packet-listener dispatch.
//!
//! Listeners are registered per selector, per direction (one
//! [`Dispatcher`] per packet family direction) and per phase. A
//! wrapper packet dispatches twice: once for the wrapper itself and
//! once for the nested value. Errors raised inside a listener are
//! logged and do not reach the read loop.

use std::{future::Future, sync::Arc};

use futures::future::{join_all, BoxFuture};
use log::error;

use crate::{
    error::Result,
    proto::{Clientbound, Direction, Serverbound},
};

/// What to do with an observed packet.
pub enum Verdict<P> {
    /// Re-encode and forward the packet unchanged.
    Forward,
    /// Forward this packet in place of the original.
    Rewrite(P),
    /// Send a no-op keep-alive instead, so the serverbound fingerprint
    /// sequence stays intact.
    Replace,
    /// Swallow the packet.
    Drop,
}

/// Which packets a listener wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Every packet, wrappers and nested values alike.
    Any,
    /// A top-level packet by `(C, CC)`.
    Main(u8, u8),
    /// A nested tribulle packet by id.
    Tribulle(i16),
    /// A nested legacy packet by its code-point pair.
    Legacy(u8, u8),
    /// A nested extension packet by name.
    Extension(&'static str),
}

/// Packet families the dispatcher can route.
pub trait Observable {
    const DIRECTION: Direction;

    /// Match against the packet itself.
    fn matches(&self, selector: &Selector) -> bool;

    /// Match against the value nested inside a wrapper packet.
    fn nested_matches(&self, selector: &Selector) -> bool;
}

impl Observable for Serverbound {
    const DIRECTION: Direction = Direction::Serverbound;

    fn matches(&self, selector: &Selector) -> bool {
        match selector {
            Selector::Any => true,
            Selector::Main(c, cc) => self.id() == (*c, *cc),
            _ => false,
        }
    }

    fn nested_matches(&self, selector: &Selector) -> bool {
        match (self, selector) {
            (Self::TribulleWrapper(w), Selector::Tribulle(id)) => w.nested.id() == *id,
            (Self::LegacyWrapper(w), Selector::Legacy(c, cc)) => w.nested.id() == (*c, *cc),
            (Self::ExtensionWrapper(w), Selector::Extension(id)) => w.nested.id() == *id,
            (Self::TribulleWrapper(_), Selector::Any) |
            (Self::LegacyWrapper(_), Selector::Any) |
            (Self::ExtensionWrapper(_), Selector::Any) => true,
            _ => false,
        }
    }
}

impl Observable for Clientbound {
    const DIRECTION: Direction = Direction::Clientbound;

    fn matches(&self, selector: &Selector) -> bool {
        match selector {
            Selector::Any => true,
            Selector::Main(c, cc) => self.id() == (*c, *cc),
            _ => false,
        }
    }

    fn nested_matches(&self, selector: &Selector) -> bool {
        match (self, selector) {
            (Self::TribulleWrapper(w), Selector::Tribulle(id)) => w.nested.id() == *id,
            (Self::LegacyWrapper(w), Selector::Legacy(c, cc)) => w.nested.id() == (*c, *cc),
            (Self::ExtensionWrapper(w), Selector::Extension(id)) => w.nested.id() == *id,
            (Self::TribulleWrapper(_), Selector::Any) |
            (Self::LegacyWrapper(_), Selector::Any) |
            (Self::ExtensionWrapper(_), Selector::Any) => true,
            _ => false,
        }
    }
}

/// Where an observed packet came from.
#[derive(Debug, Clone)]
pub struct Link {
    pub direction: Direction,
    /// Whether the packet travelled the satellite connection.
    pub satellite: bool,
    pub peer: String,
}

type ListenerFn<P> =
    Arc<dyn Fn(Arc<Link>, Arc<P>) -> BoxFuture<'static, Result<Verdict<P>>> + Send + Sync>;

/// A registry of packet listeners for one direction.
pub struct Dispatcher<P> {
    before: Vec<(Selector, ListenerFn<P>)>,
    after: Vec<(Selector, ListenerFn<P>)>,
}

impl<P> Default for Dispatcher<P> {
    fn default() -> Self {
        Self { before: vec![], after: vec![] }
    }
}

impl<P: Observable + Send + Sync + 'static> Dispatcher<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener running before the packet is forwarded. Its
    /// verdict decides what happens to the packet.
    pub fn listen<F, Fut>(&mut self, selector: Selector, listener: F)
    where
        F: Fn(Arc<Link>, Arc<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Verdict<P>>> + Send + 'static,
    {
        let listener: ListenerFn<P> =
            Arc::new(move |link, packet| Box::pin(listener(link, packet)));
        self.before.push((selector, listener));
    }

    /// Register a listener running after the packet was forwarded.
    pub fn listen_after<F, Fut>(&mut self, selector: Selector, listener: F)
    where
        F: Fn(Arc<Link>, Arc<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Verdict<P>>> + Send + 'static,
    {
        let listener: ListenerFn<P> =
            Arc::new(move |link, packet| Box::pin(listener(link, packet)));
        self.after.push((selector, listener));
    }

    async fn run(
        listeners: Vec<ListenerFn<P>>,
        link: &Arc<Link>,
        packet: &Arc<P>,
        sequential: bool,
    ) -> Vec<Verdict<P>> {
        let calls = listeners.into_iter().map(|listener| listener(link.clone(), packet.clone()));

        let results = if sequential {
            let mut results = vec![];
            for call in calls {
                results.push(call.await);
            }
            results
        } else {
            join_all(calls).await
        };

        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(verdict) => Some(verdict),
                Err(e) => {
                    error!(target: "fromage::handler", "Listener failed: {}", e);
                    None
                }
            })
            .collect()
    }

    fn select(
        listeners: &[(Selector, ListenerFn<P>)],
        packet: &P,
        nested: bool,
    ) -> Vec<ListenerFn<P>> {
        listeners
            .iter()
            .filter(|(selector, _)| {
                if nested {
                    packet.nested_matches(selector)
                } else {
                    packet.matches(selector)
                }
            })
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    /// Run the before-listeners and combine their verdicts: any `Drop`
    /// wins, then any `Replace`, then the last `Rewrite`. Wrapper
    /// packets additionally dispatch their nested value, whose
    /// verdicts are not combined.
    pub async fn dispatch_before(
        &self,
        link: &Arc<Link>,
        packet: &Arc<P>,
        sequential: bool,
    ) -> Verdict<P> {
        let verdicts =
            Self::run(Self::select(&self.before, packet, false), link, packet, sequential).await;

        let mut combined = Verdict::Forward;
        let mut dropped = false;
        let mut replaced = false;

        for verdict in verdicts {
            match verdict {
                Verdict::Drop => dropped = true,
                Verdict::Replace => replaced = true,
                Verdict::Rewrite(p) => combined = Verdict::Rewrite(p),
                Verdict::Forward => {}
            }
        }

        // The nested pass observes; it does not steer the wrapper.
        let nested = Self::select(&self.before, packet, true);
        if !nested.is_empty() {
            Self::run(nested, link, packet, sequential).await;
        }

        if dropped {
            return Verdict::Drop
        }
        if replaced {
            return Verdict::Replace
        }
        combined
    }

    /// Run the after-listeners for the packet and its nested value.
    pub async fn dispatch_after(&self, link: &Arc<Link>, packet: &Arc<P>, sequential: bool) {
        let listeners = Self::select(&self.after, packet, false);
        if !listeners.is_empty() {
            Self::run(listeners, link, packet, sequential).await;
        }

        let nested = Self::select(&self.after, packet, true);
        if !nested.is_empty() {
            Self::run(nested, link, packet, sequential).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::proto::serverbound::{KeepAlive, RoomMessage};

    fn link() -> Arc<Link> {
        Arc::new(Link {
            direction: Direction::Serverbound,
            satellite: false,
            peer: "test".to_string(),
        })
    }

    #[test]
    fn verdict_combination() {
        smol::block_on(async {
            let mut dispatcher: Dispatcher<Serverbound> = Dispatcher::new();

            dispatcher.listen(Selector::Any, |_, _| async { Ok(Verdict::Forward) });
            dispatcher
                .listen(Selector::Main(6, 6), |_, _| async { Ok(Verdict::Replace) });

            let packet = Arc::new(Serverbound::RoomMessage(RoomMessage {
                message: "hi".to_string(),
            }));
            let verdict = dispatcher.dispatch_before(&link(), &packet, true).await;
            assert!(matches!(verdict, Verdict::Replace));

            // A non-matching packet only hits the Any listener.
            let keep_alive = Arc::new(Serverbound::KeepAlive(KeepAlive {}));
            let verdict = dispatcher.dispatch_before(&link(), &keep_alive, true).await;
            assert!(matches!(verdict, Verdict::Forward));
        });
    }

    #[test]
    fn drop_wins_over_replace() {
        smol::block_on(async {
            let mut dispatcher: Dispatcher<Serverbound> = Dispatcher::new();

            dispatcher.listen(Selector::Any, |_, _| async { Ok(Verdict::Replace) });
            dispatcher.listen(Selector::Any, |_, _| async { Ok(Verdict::Drop) });

            let packet = Arc::new(Serverbound::KeepAlive(KeepAlive {}));
            let verdict = dispatcher.dispatch_before(&link(), &packet, true).await;
            assert!(matches!(verdict, Verdict::Drop));
        });
    }

    #[test]
    fn listener_errors_do_not_steer() {
        smol::block_on(async {
            let mut dispatcher: Dispatcher<Serverbound> = Dispatcher::new();

            dispatcher.listen(Selector::Any, |_, _| async {
                Err(crate::Error::Custom("boom".to_string()))
            });

            let packet = Arc::new(Serverbound::KeepAlive(KeepAlive {}));
            let verdict = dispatcher.dispatch_before(&link(), &packet, true).await;
            assert!(matches!(verdict, Verdict::Forward));
        });
    }

    #[test]
    fn nested_listeners_fire_for_wrappers() {
        smol::block_on(async {
            let fired = Arc::new(AtomicUsize::new(0));

            let mut dispatcher: Dispatcher<Serverbound> = Dispatcher::new();
            let fired2 = fired.clone();
            dispatcher.listen(Selector::Tribulle(84), move |_, _| {
                let fired = fired2.clone();
                async move {
                    fired.fetch_add(1, Ordering::SeqCst);
                    Ok(Verdict::Forward)
                }
            });

            let wrapper = Arc::new(Serverbound::TribulleWrapper(
                crate::proto::serverbound::TribulleWrapper {
                    nested: crate::proto::tribulle::serverbound::CreateTribe {
                        tribe_name: "Kikoo".to_string(),
                    }
                    .into(),
                },
            ));

            dispatcher.dispatch_before(&link(), &wrapper, true).await;
            assert_eq!(fired.load(Ordering::SeqCst), 1);

            // The nested selector does not match other packets.
            let keep_alive = Arc::new(Serverbound::KeepAlive(KeepAlive {}));
            dispatcher.dispatch_before(&link(), &keep_alive, true).await;
            assert_eq!(fired.load(Ordering::SeqCst), 1);
        });
    }
}
