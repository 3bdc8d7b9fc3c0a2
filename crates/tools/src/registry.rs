use std::cell::RefCell;
use std::rc::Rc;

use volterra_common::FrameTime;

use crate::component::{DebugInfo, Drawable, FrameContext, Updateable};

/// One section of the debug report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugEntry {
    pub description: String,
    pub info: String,
}

impl std::fmt::Display for DebugEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n{}", self.description, self.info)
    }
}

/// Typed, order-sorted component lists, one per capability.
///
/// A component implementing several capabilities is registered once per
/// capability with the same shared handle.
#[derive(Default)]
pub struct ComponentRegistry {
    updateables: Vec<Rc<RefCell<dyn Updateable>>>,
    drawables: Vec<Rc<RefCell<dyn Drawable>>>,
    debug_infos: Vec<Rc<RefCell<dyn DebugInfo>>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_updateable<T: Updateable + 'static>(&mut self, component: Rc<RefCell<T>>) {
        let order = component.borrow().update_order();
        let component: Rc<RefCell<dyn Updateable>> = component;
        insert_sorted(&mut self.updateables, component, order, |c| c.borrow().update_order());
        tracing::debug!(order, count = self.updateables.len(), "updateable registered");
    }

    pub fn register_drawable<T: Drawable + 'static>(&mut self, component: Rc<RefCell<T>>) {
        let order = component.borrow().draw_order();
        let component: Rc<RefCell<dyn Drawable>> = component;
        insert_sorted(&mut self.drawables, component, order, |c| c.borrow().draw_order());
        tracing::debug!(order, count = self.drawables.len(), "drawable registered");
    }

    pub fn register_debug_info<T: DebugInfo + 'static>(&mut self, component: Rc<RefCell<T>>) {
        let order = component.borrow().debug_order();
        let component: Rc<RefCell<dyn DebugInfo>> = component;
        insert_sorted(&mut self.debug_infos, component, order, |c| c.borrow().debug_order());
        tracing::debug!(order, count = self.debug_infos.len(), "debug info registered");
    }

    pub fn updateables(&self) -> &[Rc<RefCell<dyn Updateable>>] {
        &self.updateables
    }

    pub fn drawables(&self) -> &[Rc<RefCell<dyn Drawable>>] {
        &self.drawables
    }

    pub fn debug_infos(&self) -> &[Rc<RefCell<dyn DebugInfo>>] {
        &self.debug_infos
    }

    /// Update every enabled component in update order.
    pub fn update_all(&self, time: &FrameTime) {
        for component in &self.updateables {
            let mut component = component.borrow_mut();
            if component.enabled() {
                component.update(time);
            }
        }
    }

    /// Draw every enabled component in draw order.
    pub fn draw_all(&self, frame: &FrameContext) {
        for component in &self.drawables {
            let mut component = component.borrow_mut();
            if component.enabled() {
                component.draw(frame);
            }
        }
    }

    /// Debug info of every enabled component with output enabled, in debug
    /// order.
    pub fn debug_report(&self) -> Vec<DebugEntry> {
        self.debug_infos
            .iter()
            .map(|c| c.borrow())
            .filter(|c| c.enabled() && c.debug_output_enabled())
            .map(|c| DebugEntry {
                description: c.description().to_string(),
                info: c.debug_info(),
            })
            .collect()
    }
}

fn insert_sorted<D: ?Sized>(
    list: &mut Vec<Rc<RefCell<D>>>,
    item: Rc<RefCell<D>>,
    order: i32,
    order_of: impl Fn(&Rc<RefCell<D>>) -> i32,
) {
    let position = list.partition_point(|existing| order_of(existing) <= order);
    list.insert(position, item);
}
