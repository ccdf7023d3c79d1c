//! Static game content: oracles, god personalities and word decks.

use serde::{Deserialize, Serialize};

/// Position a player's card occupies in the composed sentence.
///
/// Declaration order is sentence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WordSlot {
    Who,
    When,
    Where,
    What,
}

impl WordSlot {
    pub const ALL: [WordSlot; 4] = [WordSlot::Who, WordSlot::When, WordSlot::Where, WordSlot::What];

    pub fn deck(self) -> &'static [&'static str] {
        match self {
            WordSlot::Who => &[
                "a sleepy dragon",
                "the village baker",
                "my grandmother",
                "a lost astronaut",
                "the mayor's cat",
                "a retired pirate",
                "two nervous ghosts",
                "the school principal",
                "an ambitious pigeon",
                "the night guard",
            ],
            WordSlot::When => &[
                "at midnight",
                "during the eclipse",
                "before breakfast",
                "on a rainy Tuesday",
                "after the festival",
                "in the year 3000",
                "while everyone slept",
                "at the last minute",
                "on a full moon",
                "during the exam",
            ],
            WordSlot::Where => &[
                "in the royal kitchen",
                "on top of the lighthouse",
                "inside a volcano",
                "at the train station",
                "under the old bridge",
                "in a crowded elevator",
                "on the moon",
                "behind the library",
                "in the haunted forest",
                "at the bottom of the sea",
            ],
            WordSlot::What => &[
                "planted a golden tree",
                "sang to the stars",
                "stole the crown",
                "baked a giant cake",
                "opened a secret door",
                "freed all the prisoners",
                "started a dance battle",
                "lit the sacred fire",
                "wrote a love letter",
                "tamed a thunderstorm",
            ],
        }
    }
}

/// Round prompts; a room never sees the same oracle twice until all are used.
pub const ORACLES: &[&str] = &[
    "Bring light to a dark place",
    "Something precious must be protected",
    "Make the heavens laugh",
    "A feast worthy of the gods",
    "Restore what was broken",
    "Courage in the face of fear",
    "Let the harvest be plentiful",
    "Peace between old enemies",
    "A journey with no return",
    "Honor the forgotten",
    "Wake the sleeping mountain",
    "A gift for the sea",
];

/// Temperament of the judging god for one game; only the traitor learns it.
pub const PERSONALITIES: &[&str] = &[
    "Benevolent: rewards kindness and generosity",
    "Wrathful: loves destruction and spectacle",
    "Whimsical: delighted by absurd nonsense",
    "Stern: values order, duty and tradition",
    "Romantic: moved by love and longing",
    "Greedy: impressed only by riches and feasts",
];
