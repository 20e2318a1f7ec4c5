/// Engine-side lifecycle of a surface.
///
/// ```text
/// Uninitialized → ContextPending → Active ⇄ {Resizing, Toggling}
///                                   Active → CleanupPending → Destroyed
/// Fatal is reachable from ContextPending and Active and is terminal.
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum SurfaceState {
    #[default]
    Uninitialized,
    ContextPending,
    Active,
    Resizing,
    Toggling,
    CleanupPending,
    Destroyed,
    Fatal,
}

impl SurfaceState {
    pub fn can_transition_to(self, next: SurfaceState) -> bool {
        use SurfaceState::*;
        matches!(
            (self, next),
            (Uninitialized, ContextPending)
                | (ContextPending, Active)
                | (ContextPending, Fatal)
                | (Active, Resizing)
                | (Resizing, Active)
                | (Active, Toggling)
                | (Toggling, ContextPending)
                | (Active, Fatal)
                | (Uninitialized | ContextPending | Active, CleanupPending)
                | (CleanupPending, Destroyed)
                // A destroyed surface may be attached again by a later request.
                | (Destroyed, ContextPending)
        )
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        self == SurfaceState::Fatal
    }

    /// States in which a `Render` request draws the surface (after any pending
    /// context creation).
    #[inline]
    pub fn accepts_frames(self) -> bool {
        matches!(
            self,
            SurfaceState::Uninitialized
                | SurfaceState::ContextPending
                | SurfaceState::Active
                | SurfaceState::Destroyed
        )
    }
}
