//! Sample component classes
//!
//! `Widget` exposes two capabilities, `IA` and `IB`. `Panel` exposes
//! `IPanel` of its own and reuses a `Widget` by aggregation, so its callers
//! see `IA` and `IB` on the panel's identity.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use com_core::{
    Class, Clsid, ComError, Iid, InnerUnknown, Interface, InterfaceEntry, Result,
};

pub const IID_IA: Iid = Iid::from_u128(0x5a1c0e30_7d2b_4e49_a8f1_3c6d2b9e0a01);
pub const IID_IB: Iid = Iid::from_u128(0x5a1c0e30_7d2b_4e49_a8f1_3c6d2b9e0a02);
pub const IID_IPANEL: Iid = Iid::from_u128(0x5a1c0e30_7d2b_4e49_a8f1_3c6d2b9e0a03);

pub const CLSID_WIDGET: Clsid = Clsid::from_u128(0x5a1c0e30_7d2b_4e49_a8f1_3c6d2b9e0c01);
pub const CLSID_PANEL: Clsid = Clsid::from_u128(0x5a1c0e30_7d2b_4e49_a8f1_3c6d2b9e0c02);

/// First widget capability: a shared counter
pub trait IA: Send + Sync {
    fn increment(&self) -> u32;
}

unsafe impl Interface for dyn IA {
    const IID: Iid = IID_IA;
}

/// Second widget capability: a description
pub trait IB: Send + Sync {
    fn describe(&self) -> String;
}

unsafe impl Interface for dyn IB {
    const IID: Iid = IID_IB;
}

/// Panel capability
pub trait IPanel: Send + Sync {
    fn title(&self) -> &str;

    /// Adopt the aggregated widget; fails if one is already attached
    fn attach(&self, inner: InnerUnknown) -> Result<()>;
}

unsafe impl Interface for dyn IPanel {
    const IID: Iid = IID_IPANEL;
}

#[derive(Debug)]
pub struct Widget {
    name: String,
    hits: AtomicU32,
}

impl Widget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hits: AtomicU32::new(0),
        }
    }
}

impl IA for Widget {
    fn increment(&self) -> u32 {
        self.hits.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl IB for Widget {
    fn describe(&self) -> String {
        format!("{} ({} hits)", self.name, self.hits.load(Ordering::Relaxed))
    }
}

impl Class for Widget {
    const CLSID: Clsid = CLSID_WIDGET;
    const NAME: &'static str = "Widget";
    const INTERFACES: &'static [InterfaceEntry<Self>] = &[
        InterfaceEntry::new(IID_IA, |w, slot| slot.put::<dyn IA>(w)),
        InterfaceEntry::new(IID_IB, |w, slot| slot.put::<dyn IB>(w)),
    ];
}

#[derive(Debug)]
pub struct Panel {
    title: String,
    widget: OnceLock<InnerUnknown>,
}

impl Panel {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            widget: OnceLock::new(),
        }
    }
}

impl IPanel for Panel {
    fn title(&self) -> &str {
        &self.title
    }

    fn attach(&self, inner: InnerUnknown) -> Result<()> {
        self.widget
            .set(inner)
            .map_err(|_| ComError::InvalidArgument("panel already has a widget".to_string()))
    }
}

impl Class for Panel {
    const CLSID: Clsid = CLSID_PANEL;
    const NAME: &'static str = "Panel";
    const INTERFACES: &'static [InterfaceEntry<Self>] = &[
        InterfaceEntry::new(IID_IPANEL, |p, slot| slot.put::<dyn IPanel>(p)),
        InterfaceEntry::new(IID_IA, |p, slot| p.widget.get().map_or(false, |w| w.query(slot))),
        InterfaceEntry::new(IID_IB, |p, slot| p.widget.get().map_or(false, |w| w.query(slot))),
    ];
}
