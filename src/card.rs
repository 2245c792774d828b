//! The catalog of secret cards
//!
//! Each game is played around one card drawn at random from a catalog.
//! Everyone except the imposter is shown the card.

use serde::{Deserialize, Serialize};

/// A secret item players describe during a game
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    /// Display name of the card
    pub name: String,
    /// Reference to the card's image, resolved by the client
    pub image: String,
}

impl Card {
    /// Creates a card from a name and image reference
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
        }
    }
}

/// An immutable, non-empty list of cards
#[derive(Debug, Clone)]
pub struct CardCatalog {
    cards: Vec<Card>,
}

impl CardCatalog {
    /// Creates a catalog from a list of cards
    ///
    /// Returns `None` if the list is empty, since a game cannot start
    /// without a card to draw.
    pub fn new(cards: Vec<Card>) -> Option<Self> {
        if cards.is_empty() {
            None
        } else {
            Some(Self { cards })
        }
    }

    /// Picks a card uniformly at random
    pub fn pick_random(&self) -> &Card {
        &self.cards[fastrand::usize(..self.cards.len())]
    }

    /// Returns every card in the catalog
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }
}

impl Default for CardCatalog {
    /// The built-in catalog
    fn default() -> Self {
        Self {
            cards: BUILT_IN
                .iter()
                .map(|(name, image)| Card::new(*name, *image))
                .collect(),
        }
    }
}

const BUILT_IN: &[(&str, &str)] = &[
    ("Archers", "archers.png"),
    ("Archer Queen", "archer-queen.png"),
    ("Baby Dragon", "baby-dragon.png"),
    ("Balloon", "balloon.png"),
    ("Bandit", "bandit.png"),
    ("Barbarians", "barbarians.png"),
    ("Bats", "bats.png"),
    ("Battle Healer", "battle-healer.png"),
    ("Battle Ram", "battle-ram.png"),
    ("Berserker", "berserker.png"),
    ("Bomber", "bomber.png"),
    ("Boss Bandit", "boss-bandit.png"),
    ("Bowler", "bowler.png"),
    ("Cannon Cart", "cannon-cart.png"),
    ("Dark Prince", "dark-prince.png"),
    ("Dart Goblin", "dart-goblin.png"),
    ("Electro Dragon", "electro-dragon.png"),
    ("Electro Giant", "electro-giant.png"),
    ("Electro Spirit", "electro-spirit.png"),
    ("Electro Wizard", "electro-wizard.png"),
    ("Elite Barbarians", "elite-barbarians.png"),
    ("Elixir Golem", "elixir-golem.png"),
    ("Executioner", "executioner.png"),
    ("Firecracker", "firecracker.png"),
    ("Fire Spirit", "fire-spirit.png"),
    ("Fisherman", "fisherman.png"),
    ("Flying Machine", "flying-machine.png"),
    ("Furnace", "furnace.png"),
    ("Giant", "giant.png"),
    ("Giant Skeleton", "giant-skeleton.png"),
    ("Goblin Gang", "goblin-gang.png"),
    ("Goblin Demolisher", "goblin-demolisher.png"),
    ("Goblin Giant", "goblin-giant.png"),
    ("Goblin Machine", "goblin-machine.png"),
    ("Goblins", "goblins.png"),
    ("Goblinstein", "goblinstein.png"),
    ("Golden Knight", "golden-knight.png"),
    ("Golem", "golem.png"),
    ("Guards", "guards.png"),
    ("Hog Rider", "hog-rider.png"),
    ("Hunter", "hunter.png"),
    ("Heal Spirit", "heal-spirit.png"),
    ("Ice Golem", "ice-golem.png"),
    ("Ice Spirit", "ice-spirit.png"),
    ("Ice Wizard", "ice-wizard.png"),
    ("Inferno Dragon", "inferno-dragon.png"),
    ("Knight", "knight.png"),
    ("Lava Hound", "lava-hound.png"),
    ("Little Prince", "little-prince.png"),
    ("Lumberjack", "lumberjack.png"),
    ("Magic Archer", "magic-archer.png"),
    ("Mega Knight", "mega-knight.png"),
    ("Mega Minion", "mega-minion.png"),
    ("Mighty Miner", "mighty-miner.png"),
    ("Miner", "miner.png"),
    ("Mini Pekka", "mini-pekka.png"),
    ("Minion Horde", "minion-horde.png"),
    ("Minions", "minions.png"),
    ("Monk", "monk.png"),
    ("Mother Witch", "mother-witch.png"),
    ("Musketeer", "musketeer.png"),
    ("Night Witch", "night-witch.png"),
    ("Pekka", "pekka.png"),
    ("Phoenix", "phoenix.png"),
    ("Prince", "prince.png"),
    ("Princess", "princess.png"),
    ("Ram Rider", "ram-rider.png"),
    ("Rascals", "rascals.png"),
    ("Royal Ghost", "royal-ghost.png"),
    ("Royal Giant", "royal-giant.png"),
    ("Royal Hogs", "royal-hogs.png"),
    ("Royal Recruits", "royal-recruits.png"),
    ("Rune Giant", "rune-giant.png"),
    ("Skeleton Army", "skeleton-army.png"),
    ("Skeleton Barrel", "skeleton-barrel.png"),
    ("Skeleton Dragons", "skeleton-dragons.png"),
    ("Skeleton King", "skeleton-king.png"),
    ("Skeletons", "skeletons.png"),
    ("Sparky", "sparky.png"),
    ("Spear Goblins", "spear-goblins.png"),
    ("Spirit Empress", "spirit-empress.png"),
    ("Suspicious Bush", "suspicious-bush.png"),
    ("Three Musketeers", "three-musketeers.png"),
    ("Valkyrie", "valkyrie.png"),
    ("Wall Breakers", "wall-breakers.png"),
    ("Witch", "witch.png"),
    ("Wizard", "wizard.png"),
    ("Zappies", "zappies.png"),
    ("Bomb Tower", "bomb-tower.png"),
    ("Cannon", "cannon.png"),
    ("Inferno Tower", "inferno-tower.png"),
    ("Mortar", "mortar.png"),
    ("Tesla", "tesla.png"),
    ("X-Bow", "x-bow.png"),
    ("Barbarian Hut", "barbarian-hut.png"),
    ("Elixir Collector", "elixir-collector.png"),
    ("Goblin Cage", "goblin-cage.png"),
    ("Goblin Drill", "goblin-drill.png"),
    ("Goblin Hut", "goblin-hut.png"),
    ("Tombstone", "tombstone.png"),
    ("Barbarian Barrel", "barbarian-barrel.png"),
    ("Rocket", "rocket.png"),
    ("Royal Delivery", "royal-delivery.png"),
    ("Goblin Barrel", "goblin-barrel.png"),
    ("Graveyard", "graveyard.png"),
];
