use std::time::Duration;

pub trait Repaint
where
    Self: Send + Sync + 'static + Clone,
{
    fn repaint(&self) {}

    fn repaint_after(&self, _delay: Duration) {}
}

impl Repaint for egui::Context {
    fn repaint(&self) {
        self.request_repaint()
    }

    fn repaint_after(&self, delay: Duration) {
        self.request_repaint_after(delay)
    }
}

impl Repaint for () {}
