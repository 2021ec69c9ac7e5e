//! Coinfight Node
//!
//! Runs an authority and a late-joining replica in one process over an
//! in-memory stream, drives a scripted match, then checks that the
//! authority, the replica and an offline replay all reach the same state.

use anyhow::{bail, Context};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use coinfight::{
    config::NodeConfig,
    game::{
        entity::{Entity, EntityRef, TypeTag},
        events::GameEventData,
        replay_frames, Command, Game, PlayerCommand, PlayerId, Target, TickResult,
    },
    network::{run_replica, Authority},
    VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NodeConfig::from_env().context("loading node config")?;

    // RUST_LOG wins over the config file
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(anyhow::Error::msg)?;

    info!("Coinfight node v{}", VERSION);
    info!(
        players = config.roster.len(),
        frames = config.demo_frames,
        checkpoint_interval = config.checkpoint_interval,
        "config loaded"
    );

    demo_match(&config).await
}

/// Scripted orders: every Gateway builds a Prime, finished Primes mine the
/// honeypot and order a Fighter, finished Fighters attack the next player's
/// Gateway.
struct DemoScript {
    honeypot: Option<EntityRef>,
    gateways: Vec<EntityRef>,
    queued: Vec<PlayerCommand>,
}

impl DemoScript {
    fn new(genesis: &Game) -> Self {
        let honeypot = genesis
            .entities()
            .find(|e| e.type_tag() == TypeTag::GoldPile)
            .map(|e| e.id);
        let gateways: Vec<EntityRef> = genesis
            .entities()
            .filter(|e| e.type_tag() == TypeTag::Gateway)
            .map(|e| e.id)
            .collect();
        let queued = gateways
            .iter()
            .enumerate()
            .map(|(owner, &gateway)| {
                PlayerCommand::new(
                    owner as PlayerId,
                    Command::BuildUnit {
                        gateway,
                        unit: TypeTag::Prime,
                    },
                )
            })
            .collect();
        Self {
            honeypot,
            gateways,
            queued,
        }
    }

    /// Orders for the next frame.
    fn take(&mut self) -> Vec<PlayerCommand> {
        std::mem::take(&mut self.queued)
    }

    fn enemy_gateway(&self, owner: PlayerId) -> Option<EntityRef> {
        let n = self.gateways.len();
        if n < 2 {
            return None;
        }
        self.gateways.get((owner as usize + 1) % n).copied()
    }

    /// React to the frame that just ran.
    fn observe(&mut self, game: &Game, result: &TickResult) {
        for event in &result.events {
            let GameEventData::UnitCompleted { entity, owner } = event.data else {
                continue;
            };
            match game.entity(entity).map(Entity::type_tag) {
                Some(TypeTag::Prime) => {
                    if let Some(pile) = self.honeypot {
                        self.queued.push(PlayerCommand::new(
                            owner,
                            Command::Pickup {
                                prime: entity,
                                target: Target::Entity(pile),
                            },
                        ));
                    }
                    if let Some(&gateway) = self.gateways.get(owner as usize) {
                        self.queued.push(PlayerCommand::new(
                            owner,
                            Command::BuildUnit {
                                gateway,
                                unit: TypeTag::Fighter,
                            },
                        ));
                    }
                }
                Some(TypeTag::Fighter) => {
                    if let Some(target) = self.enemy_gateway(owner) {
                        self.queued.push(PlayerCommand::new(
                            owner,
                            Command::Attack {
                                fighter: entity,
                                target,
                            },
                        ));
                    }
                }
                _ => {}
            }
        }
    }
}

/// Run a match through an authority and a replica, then verify.
async fn demo_match(config: &NodeConfig) -> anyhow::Result<()> {
    info!("=== Starting Demo Match ===");

    let genesis = config.genesis().context("building genesis world")?;
    let total_coins = genesis.total_coins();
    info!(
        entities = genesis.entity_count(),
        total_coins,
        "genesis hash {}",
        hex::encode(genesis.compute_hash()?)
    );

    let mut script = DemoScript::new(&genesis);
    let mut authority = Authority::new(genesis, config.checkpoint_interval);

    let (mut tx, mut rx) = tokio::io::duplex(64 * 1024);
    let max_message_bytes = config.max_message_bytes;
    let replica = tokio::spawn(async move { run_replica(&mut rx, max_message_bytes).await });

    authority.send_snapshot(&mut tx).await?;

    info!("Running {} frames...", config.demo_frames);
    let mut frames: Vec<Vec<PlayerCommand>> = Vec::new();
    let mut total_events = 0;

    for _ in 0..config.demo_frames {
        let commands = script.take();
        for cmd in &commands {
            authority.submit(cmd.player, cmd.command);
        }
        let result = authority.serve_frame(&mut tx).await?;
        total_events += result.events.len();

        for event in &result.events {
            match &event.data {
                GameEventData::UnitCompleted { entity, owner } => {
                    info!(frame = event.frame, entity, owner, "unit completed");
                }
                GameEventData::EntityDied { entity, kind, dropped } => {
                    info!(frame = event.frame, entity, kind = kind.name(), dropped, "entity died");
                }
                GameEventData::CommandRejected { player, reason } => {
                    warn!(frame = event.frame, player, %reason, "command rejected");
                }
                GameEventData::BalanceUpdated { player, amount, deposit } => {
                    info!(frame = event.frame, player, amount, deposit, "balance updated");
                }
                GameEventData::BalanceUpdateRejected { reason } => {
                    warn!(frame = event.frame, %reason, "balance update rejected");
                }
                GameEventData::EntitySpawned { .. } => {}
            }
        }

        let coins = authority.game().total_coins();
        if coins != total_coins {
            bail!("coin supply changed at frame {}: {} -> {}", result.frame, total_coins, coins);
        }

        script.observe(authority.game(), &result);
        frames.push(commands);
    }

    // Closing the stream ends the replica loop
    drop(tx);
    let replica = replica.await.context("replica task failed")??;
    info!(checkpoints = replica.checkpoints_verified(), "replica finished");

    info!("=== Match Results ===");
    let game = authority.game();
    let hash = game.compute_hash()?;
    info!("Final State Hash: {}", hex::encode(hash));
    for player in game.players() {
        info!("Player {}: credit {}", player.address(), player.credit);
    }
    info!("Live entities: {}", game.entity_count());
    info!("Total events: {}", total_events);
    debug!(view = %serde_json::to_string(&game.view())?, "final world");

    info!("=== Verifying Determinism ===");
    let replica_game = replica
        .into_game()
        .context("replica never received a snapshot")?;
    let replica_hash = replica_game.compute_hash()?;
    info!("Replica State Hash: {}", hex::encode(replica_hash));

    let (replayed, _) = replay_frames(config.genesis()?, frames.iter().map(Vec::as_slice))?;
    let replay_hash = replayed.compute_hash()?;
    info!("Replay State Hash: {}", hex::encode(replay_hash));

    if hash == replica_hash && hash == replay_hash {
        info!("DETERMINISM VERIFIED: Hashes match!");
        Ok(())
    } else {
        error!("DETERMINISM FAILURE: Hashes differ!");
        bail!("final state hashes differ")
    }
}
