/// Message tag used to disambiguate concurrent sends on the same communicator.
///
/// Pipeline flag/shape/payload exchanges and per-layer gradient pushes all share the
/// `ctrl`/`push` communicators, so every distinct kind of message gets its own tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub i32);

impl Tag {
    pub const FORWARD_FLAG: Tag = Tag(0);
    pub const FORWARD_SHAPE: Tag = Tag(1);
    pub const FORWARD_PAYLOAD: Tag = Tag(2);
    pub const BACKWARD_FLAG: Tag = Tag(3);
    pub const BACKWARD_SHAPE: Tag = Tag(4);
    pub const BACKWARD_PAYLOAD: Tag = Tag(5);

    /// Base tag for `pull_parameters`; a layer's weight and bias pulls each get
    /// their own tag so the requests issued for different layers never alias.
    pub const PULL_BASE: Tag = Tag(100);

    /// Base tag for `push_gradients`; the caller adds the layer position.
    pub const PUSH_BASE: Tag = Tag(200);

    pub fn pull_for_layer(layer: usize, part: SlotPart) -> Tag {
        Tag(Self::PULL_BASE.0 + (layer as i32) * 2 + part as i32)
    }

    pub fn push_for_layer(layer: usize, part: SlotPart) -> Tag {
        Tag(Self::PUSH_BASE.0 + (layer as i32) * 2 + part as i32)
    }
}

/// Which half of a `ParameterSlot` a tagged pull request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPart {
    Weight = 0,
    Bias = 1,
}
