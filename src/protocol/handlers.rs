use std::collections::HashMap;
use std::sync::Arc;

use crate::core::packet::PacketLength;
use crate::core::reader::PacketReader;

/// Decode callback. The reader is positioned after the frame header (and after
/// the two-byte identifier for extended packets).
pub type PacketCallback = Arc<dyn Fn(&mut PacketReader<'_>) + Send + Sync + 'static>;

#[derive(Clone)]
pub(crate) enum Route {
    Callback(PacketCallback),
    /// Payload starts with a u16 identifier looked up in the extended table
    Extended,
}

/// One entry of the dense single-byte table
#[derive(Clone)]
pub struct PacketHandler {
    id: u8,
    length: PacketLength,
    route: Route,
}

impl PacketHandler {
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn length(&self) -> PacketLength {
        self.length
    }

    /// Whether frames with this identifier carry a two-byte extended identifier
    pub fn is_extension(&self) -> bool {
        matches!(self.route, Route::Extended)
    }

    pub(crate) fn route(&self) -> &Route {
        &self.route
    }
}

impl std::fmt::Debug for PacketHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketHandler")
            .field("id", &format_args!("{:#04x}", self.id))
            .field("length", &self.length)
            .field("extension", &self.is_extension())
            .finish()
    }
}

/// Packet handler table indexed by identifier.
///
/// Single-byte identifiers live in a dense 256-slot array. Identifiers
/// registered with [`PacketHandlers::register_extension`] are carriers: their
/// frames are cut using the carrier's declared length, then routed by the
/// leading u16 of the payload through a sparse map. A carrier slot never holds
/// a callback of its own, so a frame is dispatched through exactly one table.
///
/// The table is filled once before connecting and then shared read-only
/// (`Arc<PacketHandlers>`) by every connection.
pub struct PacketHandlers {
    dense: Vec<Option<PacketHandler>>,
    extended: HashMap<u16, PacketCallback>,
}

impl Default for PacketHandlers {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketHandlers {
    pub fn new() -> Self {
        Self {
            dense: vec![None; 256],
            extended: HashMap::new(),
        }
    }

    /// Register a handler; `declared_length == 0` means length-prefixed.
    /// A later registration for the same identifier replaces the earlier one.
    pub fn register<F>(&mut self, id: u8, declared_length: u16, callback: F)
    where
        F: Fn(&mut PacketReader<'_>) + Send + Sync + 'static,
    {
        self.dense[id as usize] = Some(PacketHandler {
            id,
            length: PacketLength::from_declared(declared_length),
            route: Route::Callback(Arc::new(callback)),
        });
    }

    /// Mark `id` as a carrier for two-byte identifiers
    pub fn register_extension(&mut self, id: u8, declared_length: u16) {
        self.dense[id as usize] = Some(PacketHandler {
            id,
            length: PacketLength::from_declared(declared_length),
            route: Route::Extended,
        });
    }

    /// Register a handler for a two-byte identifier carried by an extension frame
    pub fn register_extended<F>(&mut self, id: u16, callback: F)
    where
        F: Fn(&mut PacketReader<'_>) + Send + Sync + 'static,
    {
        self.extended.insert(id, Arc::new(callback));
    }

    pub fn lookup(&self, id: u8) -> Option<&PacketHandler> {
        self.dense[id as usize].as_ref()
    }

    pub fn lookup_extended(&self, id: u16) -> Option<&PacketCallback> {
        self.extended.get(&id)
    }

    /// Number of registered single-byte identifiers, carriers included
    pub fn len(&self) -> usize {
        self.dense.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.extended.is_empty()
    }
}

impl std::fmt::Debug for PacketHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketHandlers")
            .field("registered", &self.len())
            .field("extended", &self.extended.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn lookup_returns_registration() {
        let mut handlers = PacketHandlers::new();
        assert!(handlers.is_empty());
        handlers.register(0x1B, 37, |_| {});
        handlers.register(0xAE, 0, |_| {});

        let fixed = handlers.lookup(0x1B).unwrap();
        assert_eq!(fixed.id(), 0x1B);
        assert_eq!(fixed.length(), PacketLength::Fixed(37));

        let dynamic = handlers.lookup(0xAE).unwrap();
        assert_eq!(dynamic.length(), PacketLength::Dynamic);

        assert!(handlers.lookup(0x00).is_none());
        assert_eq!(handlers.len(), 2);
    }

    #[test]
    fn last_registration_wins() {
        let hits = Arc::new(AtomicU32::new(0));
        let mut handlers = PacketHandlers::new();
        handlers.register(0x11, 4, |_| panic!("replaced handler must not run"));

        let counter = hits.clone();
        handlers.register(0x11, 0, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let handler = handlers.lookup(0x11).unwrap();
        assert_eq!(handler.length(), PacketLength::Dynamic);
        match handler.route() {
            Route::Callback(callback) => callback(&mut PacketReader::new(&[0x11])),
            Route::Extended => panic!("expected a callback"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(handlers.len(), 1);
    }

    #[test]
    fn extension_replaces_dense_callback() {
        let mut handlers = PacketHandlers::new();
        handlers.register(0xBF, 0, |_| panic!("carrier must not dispatch directly"));
        handlers.register_extension(0xBF, 0);
        handlers.register_extended(0x0018, |_| {});

        let carrier = handlers.lookup(0xBF).unwrap();
        assert!(carrier.is_extension());
        assert!(handlers.lookup_extended(0x0018).is_some());
        assert!(handlers.lookup_extended(0x0019).is_none());
    }
}
