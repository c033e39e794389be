/// The subscribers of one debugger event
pub struct Listeners<T> {
    listeners: Vec<Box<dyn FnMut(&T)>>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self { listeners: vec![] }
    }
}

impl<T> Listeners<T> {
    pub fn subscribe(&mut self, listener: impl FnMut(&T) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn notify(&mut self, value: &T) {
        for listener in &mut self.listeners {
            listener(value);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<T> std::fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Listeners({})", self.listeners.len())
    }
}
