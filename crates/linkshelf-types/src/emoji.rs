use serde::{Deserialize, Serialize};

/// Emoji available to every account.
pub const FREE_EMOJIS: &[&str] = &[
    "📁", "⭐", "❤️", "🔥", "📚", "💼", "🎵", "🎮", "🍳", "✈️", "🛒", "💡",
];

/// Emoji unlocked by an active premium subscription, in addition to the free set.
const PREMIUM_ONLY_EMOJIS: &[&str] = &[
    "🚀", "🎨", "🧠", "📷", "🎬", "🌱", "🏋️", "🧪", "💰", "🏠", "🐾", "🌍",
    "🎓", "🛠️", "📰", "🍿", "⚽", "🎁", "🔒", "🧩",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmojiSet {
    Free,
    Premium,
}

impl EmojiSet {
    pub fn emojis(&self) -> Vec<&'static str> {
        match self {
            Self::Free => FREE_EMOJIS.to_vec(),
            Self::Premium => FREE_EMOJIS
                .iter()
                .chain(PREMIUM_ONLY_EMOJIS.iter())
                .copied()
                .collect(),
        }
    }

    pub fn contains(&self, emoji: &str) -> bool {
        match self {
            Self::Free => FREE_EMOJIS.contains(&emoji),
            Self::Premium => FREE_EMOJIS.contains(&emoji) || PREMIUM_ONLY_EMOJIS.contains(&emoji),
        }
    }
}
