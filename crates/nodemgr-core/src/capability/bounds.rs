//! Latching property (spec §4.3): a value that follows its source reading
//! until explicitly locked by a user override, then holds that value until
//! unlocked. Grounded on `utility/latch_property.hpp`.

pub struct LatchProperty<T> {
    value: T,
    locked: bool,
}

impl<T: Copy> LatchProperty<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: initial,
            locked: false,
        }
    }

    pub fn get(&self) -> T {
        self.value
    }

    /// Updates the value unless a user override has locked it.
    pub fn set(&mut self, new_value: T) {
        if !self.locked {
            self.value = new_value;
        }
    }

    pub fn set_and_lock(&mut self, new_value: T) {
        self.locked = true;
        self.value = new_value;
    }

    pub fn set_and_unlock(&mut self, new_value: T) {
        self.locked = false;
        self.value = new_value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_follows_source_until_locked() {
        let mut prop = LatchProperty::new(1.0);
        prop.set(2.0);
        assert_eq!(prop.get(), 2.0);

        prop.set_and_lock(5.0);
        prop.set(2.0);
        assert_eq!(prop.get(), 5.0);

        prop.set_and_unlock(3.0);
        prop.set(4.0);
        assert_eq!(prop.get(), 4.0);
    }
}
