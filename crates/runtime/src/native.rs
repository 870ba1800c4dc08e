//! The native-function bridge (§4.6): a bounded, replace-on-duplicate
//! table of Rust functions callable by name from compiled bytecode via
//! `CALL_NATIVE`.

use osfl_core::Value;

pub const MAX_NATIVES: usize = 64;

pub type NativeResult = Result<Value, String>;
pub type NativeFn = fn(&[Value]) -> NativeResult;

#[derive(Default)]
pub struct NativeRegistry {
    entries: Vec<(String, NativeFn)>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        NativeRegistry::default()
    }

    /// Registers `name -> f`. A second registration under the same name
    /// replaces the first, matching the bridge's replace-not-duplicate
    /// contract; otherwise returns an error once the table is full.
    pub fn register(&mut self, name: &str, f: NativeFn) -> Result<(), String> {
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| n == name) {
            slot.1 = f;
            return Ok(());
        }
        if self.entries.len() >= MAX_NATIVES {
            return Err(format!("native function table is full (limit {MAX_NATIVES})"));
        }
        self.entries.push((name.to_string(), f));
        Ok(())
    }

    pub fn call(&self, name: &str, args: &[Value]) -> NativeResult {
        match self.entries.iter().find(|(n, _)| n == name) {
            Some((_, f)) => f(args),
            None => Err(format!("undefined native function '{name}'")),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_args: &[Value]) -> NativeResult {
        Ok(Value::Null)
    }

    fn other(_args: &[Value]) -> NativeResult {
        Ok(Value::Int(1))
    }

    #[test]
    fn registering_same_name_twice_replaces() {
        let mut reg = NativeRegistry::new();
        reg.register("f", noop).unwrap();
        reg.register("f", other).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.call("f", &[]).unwrap(), Value::Int(1));
    }

    #[test]
    fn calling_unknown_name_errors() {
        let reg = NativeRegistry::new();
        assert!(reg.call("missing", &[]).is_err());
    }

    #[test]
    fn table_rejects_past_the_cap() {
        let mut reg = NativeRegistry::new();
        for i in 0..MAX_NATIVES {
            reg.register(&format!("f{i}"), noop).unwrap();
        }
        assert!(reg.register("one_more", noop).is_err());
    }
}
