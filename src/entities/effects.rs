use serde::{Deserialize, Serialize};

/// Client-visible magic effect id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MagicEffect(pub u8);

impl MagicEffect {
    pub const DRAW_BLOOD: MagicEffect = MagicEffect(0);
    pub const LOSE_ENERGY: MagicEffect = MagicEffect(1);
    pub const PUFF: MagicEffect = MagicEffect(2);
    pub const BLOCK_HIT: MagicEffect = MagicEffect(3);
    pub const EXPLOSION_AREA: MagicEffect = MagicEffect(4);
    pub const POFF: MagicEffect = MagicEffect(6);
    pub const TELEPORT: MagicEffect = MagicEffect(10);
    pub const ENERGY_AREA: MagicEffect = MagicEffect(11);

    pub fn id(self) -> u8 {
        self.0
    }
}

impl Default for MagicEffect {
    fn default() -> Self {
        MagicEffect::PUFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_effect_is_puff() {
        assert_eq!(MagicEffect::default(), MagicEffect::PUFF);
        assert_eq!(MagicEffect::PUFF.id(), 2);
    }

    #[test]
    fn effect_deserializes_from_plain_number() {
        let effect: MagicEffect = serde_yaml::from_str("10").expect("parse effect");
        assert_eq!(effect, MagicEffect::TELEPORT);
    }
}
