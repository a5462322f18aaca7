//! Ephemeral UI state: selection and the direct-map segment creation
//! flow. Never persisted; cancellation has no side effects on the trip.

/// Current selection: at most one of a spot or a (day, segment) pair.
/// Selecting either kind clears the other.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    Spot(String),
    Segment { day_id: String, segment_id: String },
}

#[derive(Debug, Default)]
pub struct SelectionState {
    selection: Selection,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn select_spot(&mut self, spot_id: impl Into<String>) {
        self.selection = Selection::Spot(spot_id.into());
    }

    pub fn select_segment(&mut self, day_id: impl Into<String>, segment_id: impl Into<String>) {
        self.selection = Selection::Segment {
            day_id: day_id.into(),
            segment_id: segment_id.into(),
        };
    }

    pub fn clear(&mut self) {
        self.selection = Selection::None;
    }

    /// Drops the selection if it references the given spot; called when a
    /// spot is removed from the trip.
    pub fn forget_spot(&mut self, spot_id: &str) {
        if matches!(&self.selection, Selection::Spot(id) if id == spot_id) {
            self.selection = Selection::None;
        }
    }

    /// Drops the selection if it references the given segment.
    pub fn forget_segment(&mut self, segment_id: &str) {
        if matches!(&self.selection, Selection::Segment { segment_id: id, .. } if id == segment_id)
        {
            self.selection = Selection::None;
        }
    }
}

/// Multi-step segment creation by direct map interaction.
///
/// `Idle → AwaitingSecondSpot → AwaitingDayAssignment → Idle`, advancing
/// on "first spot picked", "second distinct spot picked", and "day chosen
/// or cancelled". Picking the same spot again is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SegmentDraft {
    #[default]
    Idle,
    AwaitingSecondSpot {
        first_spot_id: String,
    },
    AwaitingDayAssignment {
        first_spot_id: String,
        second_spot_id: String,
    },
}

impl SegmentDraft {
    /// Starts (or restarts) the flow with the first endpoint.
    pub fn start(&mut self, spot_id: impl Into<String>) {
        *self = SegmentDraft::AwaitingSecondSpot {
            first_spot_id: spot_id.into(),
        };
    }

    /// Records the second endpoint; ignored unless a distinct first spot
    /// is pending.
    pub fn pick_second(&mut self, spot_id: &str) {
        *self = match std::mem::take(self) {
            SegmentDraft::AwaitingSecondSpot { first_spot_id } if first_spot_id != spot_id => {
                SegmentDraft::AwaitingDayAssignment {
                    first_spot_id,
                    second_spot_id: spot_id.to_string(),
                }
            }
            other => other,
        };
    }

    /// Completes the flow on day assignment, returning the endpoint pair
    /// and resetting to idle. `None` if both endpoints were not picked.
    pub fn take_pair(&mut self) -> Option<(String, String)> {
        match std::mem::take(self) {
            SegmentDraft::AwaitingDayAssignment {
                first_spot_id,
                second_spot_id,
            } => Some((first_spot_id, second_spot_id)),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Unconditional reset with no durable side effects.
    pub fn cancel(&mut self) {
        *self = SegmentDraft::Idle;
    }

    /// Resets the flow if it references the given spot; called when a
    /// spot is removed from the trip.
    pub fn forget_spot(&mut self, spot_id: &str) {
        let references = match self {
            SegmentDraft::Idle => false,
            SegmentDraft::AwaitingSecondSpot { first_spot_id } => first_spot_id == spot_id,
            SegmentDraft::AwaitingDayAssignment {
                first_spot_id,
                second_spot_id,
            } => first_spot_id == spot_id || second_spot_id == spot_id,
        };
        if references {
            *self = SegmentDraft::Idle;
        }
    }
}
