use std::fmt::Display;

/// Pre-fetch distance below the viewport, in pixels.
pub const PREFETCH_MARGIN_PX: i32 = 200;

/// Margin grown around the observation root, CSS order (top right bottom left).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootMargin {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl RootMargin {
    /// Margin that only extends past the bottom edge of the root.
    pub const fn trailing(px: i32) -> Self {
        Self {
            top: 0,
            right: 0,
            bottom: px,
            left: 0,
        }
    }
}

impl Default for RootMargin {
    fn default() -> Self {
        Self::trailing(PREFETCH_MARGIN_PX)
    }
}

impl Display for RootMargin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}px {}px {}px {}px",
            self.top, self.right, self.bottom, self.left
        )
    }
}

/// Options for a viewport observation. `root: None` means the viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportOptions<R = ()> {
    pub root: Option<R>,
    pub root_margin: RootMargin,
    pub threshold: f64,
}

impl<R> Default for ViewportOptions<R> {
    fn default() -> Self {
        Self {
            root: None,
            root_margin: RootMargin::default(),
            threshold: 0.0,
        }
    }
}

/// The host's visibility machinery, e.g. a DOM `IntersectionObserver`.
pub trait Observer {
    type Sentinel: Clone + PartialEq;
    type Root;

    fn observe(&mut self, sentinel: &Self::Sentinel, options: &ViewportOptions<Self::Root>);
    fn unobserve(&mut self, sentinel: &Self::Sentinel);
}

/// A change in the intersecting state reported by [`ViewportTrigger::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Entered,
    Left,
    Unchanged,
}

/// Turns raw intersection entries for one sentinel into edge transitions.
///
/// At most one sentinel is observed at a time. Attaching a new sentinel
/// releases the previous one and dropping the trigger releases whatever is
/// still observed.
pub struct ViewportTrigger<O: Observer> {
    observer: O,
    options: ViewportOptions<O::Root>,
    once: bool,
    fired: bool,
    sentinel: Option<O::Sentinel>,
    intersecting: bool,
}

impl<O: Observer> ViewportTrigger<O> {
    pub fn new(observer: O, options: ViewportOptions<O::Root>) -> Self {
        Self {
            observer,
            options,
            once: false,
            fired: false,
            sentinel: None,
            intersecting: false,
        }
    }

    /// A trigger that stops observing after the first time it fires.
    pub fn once(observer: O, options: ViewportOptions<O::Root>) -> Self {
        let mut trigger = Self::new(observer, options);
        trigger.once = true;
        trigger
    }

    pub fn attach(&mut self, sentinel: O::Sentinel) {
        if self.sentinel.as_ref() == Some(&sentinel) {
            return;
        }
        self.detach();
        if self.once && self.fired {
            return;
        }

        tracing::trace!("observing sentinel");
        self.observer.observe(&sentinel, &self.options);
        self.sentinel = Some(sentinel);
        self.intersecting = false;
    }

    pub fn detach(&mut self) {
        if let Some(sentinel) = self.sentinel.take() {
            tracing::trace!("releasing sentinel");
            self.observer.unobserve(&sentinel);
        }
    }

    /// Feeds one intersection entry for the attached sentinel.
    ///
    /// Entries that arrive while nothing is attached are ignored; the host
    /// may still deliver a queued entry right after a detach.
    pub fn record(&mut self, is_intersecting: bool) -> Transition {
        if self.sentinel.is_none() || is_intersecting == self.intersecting {
            return Transition::Unchanged;
        }

        self.intersecting = is_intersecting;
        if !is_intersecting {
            return Transition::Left;
        }

        if self.once {
            self.fired = true;
            self.detach();
        }
        Transition::Entered
    }

    pub fn is_intersecting(&self) -> bool {
        self.intersecting
    }

    pub fn is_attached(&self) -> bool {
        self.sentinel.is_some()
    }

    pub fn options(&self) -> &ViewportOptions<O::Root> {
        &self.options
    }
}

impl<O: Observer> Drop for ViewportTrigger<O> {
    fn drop(&mut self) {
        self.detach();
    }
}
