use crate::{DenaroDeserialize, DenaroSerialize, SerializationError};

/// The 1-based position of a block in the chain. Genesis is `Height(1)`.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Height(pub u32);

impl Height {
    /// The height of the genesis block.
    pub const MIN: Height = Height(1);

    pub fn succ(self) -> Height {
        Height(self.0 + 1)
    }

    pub fn pred(self) -> Option<Height> {
        if self.0 > 1 {
            Some(Height(self.0 - 1))
        } else {
            None
        }
    }
}

impl std::fmt::Display for Height {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl DenaroSerialize for Height {
    fn denaro_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        self.0.denaro_serialize(&mut writer)
    }
}

impl DenaroDeserialize for Height {
    fn denaro_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Height(u32::denaro_deserialize(&mut reader)?))
    }
}
