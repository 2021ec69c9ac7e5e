//! World State
//!
//! [`Game`] owns the roster, the entity table and the frame counter.
//!
//! ## Entity Table
//!
//! ```text
//! entities: Vec<Entity>            insertion order = tick order = wire order
//! index:    BTreeMap<ref, slot>    every entity in the table, dead or alive
//! ```
//!
//! Dead entities stay in the table, unreachable through [`Game::entity`],
//! until [`Game::compact`] removes them at the end of the frame. Their refs
//! stay reserved until then, so a ref is never handed out twice in one frame.
//!
//! New refs are derived from the table alone (one past the highest ref in
//! use), so a replica that joined from a snapshot allocates the same refs as
//! one that has run since genesis.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::codec::{CodecError, Packer, Unpacker};
use crate::core::coins::{Coins, CoinsInt, LedgerError};
use crate::core::hash::{compute_state_hash, StateHash};
use crate::core::vec2::Vec2;
use crate::game::entity::{Entity, EntityKind, EntityRef, NULL_ENTITY_REF};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::gateway::Gateway;
use crate::game::gold_pile::GoldPile;
use crate::game::player::{BalanceRejection, BalanceUpdate, Player, PlayerId};
use crate::game::rules::GATEWAY_COST;

/// Errors that stop the simulation. A participant that hits one has
/// diverged and must not continue.
#[derive(Debug, Error)]
pub enum GameError {
    /// Malformed input
    #[error("protocol error: {0}")]
    Codec(#[from] CodecError),

    /// Coin arithmetic that cannot be satisfied without breaking conservation
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A frame packet arrived for the wrong frame
    #[error("frame packet for frame {got} applied at frame {expected}")]
    FrameMismatch {
        /// Frame the world is at
        expected: u64,
        /// Frame the packet was for
        got: u64,
    },

    /// Genesis credit for a player not in the roster
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    /// A genesis operation after the first frame has run
    #[error("genesis is closed at frame {0}")]
    GenesisClosed(u64),

    /// A genesis entity found every ref in use
    #[error("entity table is full")]
    TableFull,
}

/// Complete simulation state.
#[derive(Debug, PartialEq)]
pub struct Game {
    /// Frames simulated so far
    pub frame: u64,
    pub(crate) players: Vec<Player>,
    pub(crate) entities: Vec<Entity>,
    index: BTreeMap<EntityRef, usize>,
    pending_events: Vec<GameEvent>,
}

impl Game {
    /// An empty world at frame 0.
    pub fn new(players: Vec<Player>) -> Self {
        Self {
            frame: 0,
            players,
            entities: Vec::new(),
            index: BTreeMap::new(),
            pending_events: Vec::new(),
        }
    }

    /// An empty world for the given player addresses, in roster order.
    pub fn with_roster<I, S>(addresses: I) -> Result<Self, CodecError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let players = addresses
            .into_iter()
            .map(Player::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(players))
    }

    // =========================================================================
    // PLAYERS
    // =========================================================================

    /// The roster.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Look up a player.
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id as usize)
    }

    /// Id of the player with `address`.
    pub fn player_address_to_id(&self, address: &str) -> Option<PlayerId> {
        self.players
            .iter()
            .position(|p| p.address() == address)
            .and_then(|i| PlayerId::try_from(i).ok())
    }

    /// Address of player `id`.
    pub fn player_id_to_address(&self, id: PlayerId) -> Option<&str> {
        self.player(id).map(Player::address)
    }

    // =========================================================================
    // ENTITIES
    // =========================================================================

    /// Live entities in table order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| !e.dead)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities().count()
    }

    /// A live entity by ref.
    pub fn entity(&self, r: EntityRef) -> Option<&Entity> {
        self.live_index(r).map(|i| &self.entities[i])
    }

    /// A live entity by ref, mutably.
    pub fn entity_mut(&mut self, r: EntityRef) -> Option<&mut Entity> {
        self.live_index(r).map(|i| &mut self.entities[i])
    }

    /// Table slot of a live entity.
    pub(crate) fn live_index(&self, r: EntityRef) -> Option<usize> {
        self.index
            .get(&r)
            .copied()
            .filter(|&i| !self.entities[i].dead)
    }

    /// Two distinct table slots, both mutably.
    pub(crate) fn pair_mut(&mut self, a: usize, b: usize) -> (&mut Entity, &mut Entity) {
        assert_ne!(a, b, "pair_mut needs two distinct slots");
        if a < b {
            let (left, right) = self.entities.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.entities.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    /// The ref the next spawn will get, if any is free.
    ///
    /// One past the highest ref in the table; once that would pass
    /// `u16::MAX`, the lowest unused ref.
    pub fn next_entity_ref(&self) -> Option<EntityRef> {
        match self.index.keys().next_back() {
            None => Some(1),
            Some(&max) if max < EntityRef::MAX => Some(max + 1),
            Some(_) => (1..=EntityRef::MAX).find(|r| !self.index.contains_key(r)),
        }
    }

    /// Add an entity at the end of the table. Gives the kind back if every
    /// ref is taken.
    fn try_spawn(&mut self, pos: Vec2, kind: EntityKind) -> Result<EntityRef, EntityKind> {
        let Some(id) = self.next_entity_ref() else {
            return Err(kind);
        };
        let entity = Entity::new(id, pos, kind);
        let tag = entity.type_tag();
        self.index.insert(id, self.entities.len());
        self.entities.push(entity);
        debug!(frame = self.frame, entity = id, kind = tag.name(), "spawned");
        self.push_event(GameEventData::EntitySpawned { entity: id, kind: tag });
        Ok(id)
    }

    /// Add an entity at the end of the table.
    pub(crate) fn spawn(&mut self, pos: Vec2, kind: EntityKind) -> Option<EntityRef> {
        self.try_spawn(pos, kind).ok()
    }

    // =========================================================================
    // GENESIS
    // =========================================================================

    fn check_genesis(&self) -> Result<(), GameError> {
        if self.frame != 0 {
            return Err(GameError::GenesisClosed(self.frame));
        }
        Ok(())
    }

    /// Create a gold pile out of nothing. Genesis only.
    pub fn mint_gold_pile(&mut self, pos: Vec2, amount: CoinsInt) -> Result<EntityRef, GameError> {
        self.check_genesis()?;
        let id = self
            .spawn(pos, EntityKind::GoldPile(GoldPile::new(Coins::mint(amount))))
            .ok_or(GameError::TableFull)?;
        info!(entity = id, amount, %pos, "minted gold pile");
        Ok(id)
    }

    /// Place a completed Gateway for `owner`, its cost minted into it.
    /// Genesis only.
    pub fn mint_gateway(&mut self, owner: PlayerId, pos: Vec2) -> Result<EntityRef, GameError> {
        self.check_genesis()?;
        if owner as usize >= self.players.len() {
            return Err(GameError::UnknownPlayer(owner));
        }
        let mut gateway = Gateway::new(owner);
        gateway.building.unit.gold_invested = Coins::mint(GATEWAY_COST);
        let id = self
            .spawn(pos, EntityKind::Gateway(gateway))
            .ok_or(GameError::TableFull)?;
        info!(entity = id, owner, %pos, "minted gateway");
        Ok(id)
    }

    /// Credit a player out of nothing. Genesis only.
    pub fn mint_to_player(&mut self, id: PlayerId, amount: CoinsInt) -> Result<(), GameError> {
        self.check_genesis()?;
        let player = self
            .players
            .get_mut(id as usize)
            .ok_or(GameError::UnknownPlayer(id))?;
        player.credit.deposit(Coins::mint(amount))?;
        info!(player = id, amount, "minted player credit");
        Ok(())
    }

    /// Seed the world: a honeypot gold pile, plus `seed_credit` for every
    /// player.
    pub fn start_match(
        &mut self,
        honeypot: CoinsInt,
        honeypot_pos: Vec2,
        seed_credit: CoinsInt,
    ) -> Result<Option<EntityRef>, GameError> {
        self.check_genesis()?;
        let pile = if honeypot > 0 {
            Some(self.mint_gold_pile(honeypot_pos, honeypot)?)
        } else {
            None
        };
        if seed_credit > 0 {
            for id in 0..self.players.len() {
                let id = PlayerId::try_from(id).map_err(|_| CodecError::CountTooLarge(id as u64))?;
                self.mint_to_player(id, seed_credit)?;
            }
        }
        Ok(pile)
    }

    // =========================================================================
    // DEATH AND COMPACTION
    // =========================================================================

    /// Kill a live entity now. Returns false if it was not alive.
    pub fn kill(&mut self, r: EntityRef) -> Result<bool, GameError> {
        match self.live_index(r) {
            Some(idx) => {
                self.kill_at(idx)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Mark the entity in `idx` dead and drop everything it held into a new
    /// gold pile at its position.
    pub(crate) fn kill_at(&mut self, idx: usize) -> Result<(), GameError> {
        let entity = &mut self.entities[idx];
        if entity.dead {
            return Ok(());
        }
        entity.dead = true;
        let (id, pos, tag) = (entity.id, entity.pos, entity.type_tag());
        let dropped = entity.take_droppable_coins()?;
        let amount = dropped.balance();
        debug!(frame = self.frame, entity = id, kind = tag.name(), dropped = amount, "died");
        self.push_event(GameEventData::EntityDied {
            entity: id,
            kind: tag,
            dropped: amount,
        });

        if dropped.is_empty() {
            return Ok(());
        }
        if let Err(EntityKind::GoldPile(pile)) =
            self.try_spawn(pos, EntityKind::GoldPile(GoldPile::new(dropped)))
        {
            // Table is full: the corpse itself becomes the pile.
            let entity = &mut self.entities[idx];
            entity.kind = EntityKind::GoldPile(pile);
            entity.dead = false;
        }
        Ok(())
    }

    /// Remove dead entities and every reference to them.
    pub(crate) fn compact(&mut self) {
        let removed: BTreeSet<EntityRef> = self
            .entities
            .iter()
            .filter(|e| e.dead)
            .map(|e| e.id)
            .collect();
        if removed.is_empty() {
            return;
        }
        self.entities.retain(|e| !e.dead);
        for entity in &mut self.entities {
            entity.forget_refs(&removed);
        }
        self.rebuild_index();
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id, i))
            .collect();
    }

    // =========================================================================
    // ACCOUNTING
    // =========================================================================

    /// Every coin in the world: player credit plus all entity ledgers.
    ///
    /// Constant from the end of genesis onwards, except across balance
    /// updates.
    pub fn total_coins(&self) -> u64 {
        let credit: u64 = self.players.iter().map(|p| p.credit.balance() as u64).sum();
        let held: u64 = self.entities().map(Entity::coins_held).sum();
        credit + held
    }

    /// Apply one external deposit or withdrawal to a player's credit.
    ///
    /// Deposits are new value entering the world; withdrawals leave it. A
    /// rejected update changes nothing.
    pub fn apply_balance_update(&mut self, update: &BalanceUpdate) -> Result<PlayerId, BalanceRejection> {
        let id = self
            .player_address_to_id(&update.address)
            .ok_or_else(|| BalanceRejection::UnknownAddress(update.address.clone()))?;
        let credit = &mut self.players[id as usize].credit;
        let available = credit.balance();
        if update.is_deposit {
            credit
                .deposit(Coins::mint(update.amount))
                .map_err(|_| BalanceRejection::Overflow {
                    player: id,
                    amount: update.amount,
                    available,
                })?;
        } else {
            let withdrawn = credit
                .withdraw_exact(update.amount)
                .map_err(|_| BalanceRejection::InsufficientFunds {
                    player: id,
                    amount: update.amount,
                    available,
                })?;
            withdrawn.burn();
        }
        Ok(id)
    }

    /// Apply a frame's balance updates in order, recording each as an event.
    pub fn apply_balance_updates(&mut self, updates: &[BalanceUpdate]) {
        for update in updates {
            match self.apply_balance_update(update) {
                Ok(player) => {
                    info!(
                        frame = self.frame,
                        player,
                        amount = update.amount,
                        deposit = update.is_deposit,
                        "balance updated"
                    );
                    self.push_event(GameEventData::BalanceUpdated {
                        player,
                        amount: update.amount,
                        deposit: update.is_deposit,
                    });
                }
                Err(reason) => {
                    debug!(frame = self.frame, address = %update.address, %reason, "balance update rejected");
                    self.push_event(GameEventData::BalanceUpdateRejected { reason });
                }
            }
        }
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Record an event for the current frame.
    pub fn push_event(&mut self, data: GameEventData) {
        self.pending_events.push(GameEvent::new(self.frame, data));
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    /// Encode the whole world.
    pub fn pack_into(&self, p: &mut Packer) -> Result<(), CodecError> {
        p.put_u64(self.frame);
        p.put_u32(count_u32(self.players.len())?);
        for player in &self.players {
            player.pack(p)?;
        }
        p.put_u32(count_u32(self.entity_count())?);
        for entity in self.entities() {
            entity.pack(p);
        }
        Ok(())
    }

    /// Encode the whole world into a fresh buffer.
    pub fn pack(&self) -> Result<Vec<u8>, CodecError> {
        let mut p = Packer::new();
        self.pack_into(&mut p)?;
        Ok(p.into_bytes())
    }

    /// Decode a world, validating refs and owners.
    pub fn unpack_from(u: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        let frame = u.get_u64()?;
        let player_count = u.get_count()?;
        let mut players = Vec::with_capacity(player_count.min(u.remaining()));
        for _ in 0..player_count {
            players.push(Player::unpack(u)?);
        }

        let entity_count = u.get_count()?;
        let mut entities = Vec::with_capacity(entity_count.min(u.remaining()));
        let mut seen = BTreeSet::new();
        for _ in 0..entity_count {
            let entity = Entity::unpack(u)?;
            if entity.id == NULL_ENTITY_REF || !seen.insert(entity.id) {
                return Err(CodecError::InvalidEntityRef(entity.id));
            }
            if let Some(owner) = entity.owner() {
                if owner as usize >= players.len() {
                    return Err(CodecError::InvalidOwner {
                        entity: entity.id,
                        owner,
                    });
                }
            }
            entities.push(entity);
        }

        let mut game = Self {
            frame,
            players,
            entities,
            index: BTreeMap::new(),
            pending_events: Vec::new(),
        };
        game.rebuild_index();
        Ok(game)
    }

    /// Decode a world that must fill `bytes` exactly.
    pub fn unpack(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut u = Unpacker::new(bytes);
        let game = Self::unpack_from(&mut u)?;
        u.finish()?;
        Ok(game)
    }

    /// Digest of the packed world, for comparing replicas.
    pub fn compute_hash(&self) -> Result<StateHash, CodecError> {
        Ok(compute_state_hash(self.frame, &self.pack()?))
    }
}

fn count_u32(n: usize) -> Result<u32, CodecError> {
    u32::try_from(n).map_err(|_| CodecError::CountTooLarge(n as u64))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::prime::Prime;
    use crate::game::target::Target;

    #[test]
    fn test_refs_are_allocated_from_table() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        assert_eq!(game.next_entity_ref(), Some(1));
        let a = game.mint_gold_pile(Vec2::ZERO, 1).unwrap();
        let b = game.mint_gold_pile(Vec2::ZERO, 1).unwrap();
        assert_eq!((a, b), (1, 2));

        // Dead refs stay reserved until compaction.
        game.kill(b).unwrap();
        assert_eq!(game.next_entity_ref(), Some(4));
        game.compact();
        // b's coins moved to pile 3; b's slot is gone.
        assert!(game.entity(b).is_none());
        assert_eq!(game.next_entity_ref(), Some(4));
    }

    #[test]
    fn test_ref_search_after_max() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        game.entities.push(Entity::new(
            u16::MAX,
            Vec2::ZERO,
            EntityKind::GoldPile(GoldPile::default()),
        ));
        game.entities.push(Entity::new(1, Vec2::ZERO, EntityKind::GoldPile(GoldPile::default())));
        game.rebuild_index();
        assert_eq!(game.next_entity_ref(), Some(2));
    }

    #[test]
    fn test_snapshot_roundtrip_and_hash() {
        let mut game = Game::with_roster(["alice", "bob"]).unwrap();
        game.start_match(500, Vec2::new(100.0, 100.0), 250).unwrap();
        let mut prime = Prime::new(1);
        prime.cmd_pickup(Target::Entity(1));
        game.spawn(Vec2::new(-3.5, 8.25), EntityKind::Prime(prime)).unwrap();
        game.take_events();

        let bytes = game.pack().unwrap();
        let back = Game::unpack(&bytes).unwrap();
        assert_eq!(back, game);
        assert_eq!(back.compute_hash().unwrap(), game.compute_hash().unwrap());
        assert_eq!(back.player_address_to_id("bob"), Some(1));
        assert_eq!(back.player_id_to_address(0), Some("alice"));
        assert_eq!(back.total_coins(), 1000);
    }

    #[test]
    fn test_snapshot_rejects_bad_owner_and_duplicate_ref() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        game.spawn(Vec2::ZERO, EntityKind::Prime(Prime::new(5))).unwrap();
        assert_eq!(
            Game::unpack(&game.pack().unwrap()),
            Err(CodecError::InvalidOwner { entity: 1, owner: 5 })
        );

        let mut game = Game::with_roster(["alice"]).unwrap();
        game.entities.push(Entity::new(3, Vec2::ZERO, EntityKind::GoldPile(GoldPile::default())));
        game.entities.push(Entity::new(3, Vec2::ZERO, EntityKind::GoldPile(GoldPile::default())));
        assert_eq!(
            Game::unpack(&game.pack().unwrap()),
            Err(CodecError::InvalidEntityRef(3))
        );
    }

    #[test]
    fn test_snapshot_trailing_bytes() {
        let game = Game::with_roster(["alice"]).unwrap();
        let mut bytes = game.pack().unwrap();
        bytes.push(0);
        assert_eq!(Game::unpack(&bytes), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn test_kill_conserves_coins() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        let mut prime = Prime::new(0);
        prime.held_gold = Coins::mint(40);
        prime.mobile.unit.gold_invested = Coins::mint(10);
        let id = game.spawn(Vec2::new(1.0, 2.0), EntityKind::Prime(prime)).unwrap();
        assert_eq!(game.total_coins(), 50);

        assert!(game.kill(id).unwrap());
        assert!(!game.kill(id).unwrap());
        assert_eq!(game.total_coins(), 50);
        game.compact();
        assert_eq!(game.entity_count(), 1);
        let pile = game.entities().next().unwrap();
        assert_eq!(pile.pos, Vec2::new(1.0, 2.0));
        assert_eq!(pile.coins_held(), 50);
    }

    #[test]
    fn test_mint_gateway_is_complete() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        assert!(matches!(
            game.mint_gateway(1, Vec2::ZERO),
            Err(GameError::UnknownPlayer(1))
        ));
        let id = game.mint_gateway(0, Vec2::new(5.0, 5.0)).unwrap();
        let gateway = game.entity(id).unwrap();
        assert!(gateway.is_active());
        assert_eq!(gateway.owner(), Some(0));
        assert_eq!(game.total_coins(), GATEWAY_COST as u64);
    }

    #[test]
    fn test_genesis_closes_after_first_frame() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        game.start_match(10, Vec2::ZERO, 5).unwrap();
        game.iterate().unwrap();
        let before = game.pack().unwrap();

        assert!(matches!(game.mint_to_player(0, 1), Err(GameError::GenesisClosed(1))));
        assert!(matches!(game.mint_gold_pile(Vec2::ZERO, 1), Err(GameError::GenesisClosed(1))));
        assert!(matches!(game.mint_gateway(0, Vec2::ZERO), Err(GameError::GenesisClosed(1))));
        assert!(matches!(
            game.start_match(10, Vec2::ZERO, 5),
            Err(GameError::GenesisClosed(1))
        ));
        assert_eq!(game.pack().unwrap(), before);
    }

    #[test]
    fn test_balance_updates() {
        let mut game = Game::with_roster(["alice", "bob"]).unwrap();
        game.iterate().unwrap();

        game.apply_balance_updates(&[
            BalanceUpdate::deposit("bob", 300),
            BalanceUpdate::withdrawal("bob", 120),
            BalanceUpdate::withdrawal("alice", 1),
            BalanceUpdate::deposit("carol", 5),
            BalanceUpdate::deposit("bob", u32::MAX),
        ]);
        assert_eq!(game.player(1).unwrap().credit.balance(), 180);
        assert!(game.player(0).unwrap().credit.is_empty());
        assert_eq!(game.total_coins(), 180);

        let events: Vec<_> = game.take_events().into_iter().map(|e| e.data).collect();
        assert_eq!(
            events,
            vec![
                GameEventData::BalanceUpdated { player: 1, amount: 300, deposit: true },
                GameEventData::BalanceUpdated { player: 1, amount: 120, deposit: false },
                GameEventData::BalanceUpdateRejected {
                    reason: BalanceRejection::InsufficientFunds { player: 0, amount: 1, available: 0 }
                },
                GameEventData::BalanceUpdateRejected {
                    reason: BalanceRejection::UnknownAddress("carol".into())
                },
                GameEventData::BalanceUpdateRejected {
                    reason: BalanceRejection::Overflow { player: 1, amount: u32::MAX, available: 180 }
                },
            ]
        );
    }

    #[test]
    fn test_mint_to_unknown_player() {
        let mut game = Game::with_roster(["alice"]).unwrap();
        assert!(matches!(game.mint_to_player(3, 1), Err(GameError::UnknownPlayer(3))));
        game.mint_to_player(0, u32::MAX).unwrap();
        assert!(matches!(
            game.mint_to_player(0, 1),
            Err(GameError::Ledger(LedgerError::Overflow { .. }))
        ));
    }
}
