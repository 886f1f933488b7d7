//! The hybrid table: an array part for positive integer keys, a string
//! part preserving insertion order, and a generic part for every other
//! key, plus an optional metatable.
//!
//! Raw access here never consults metatables; the `__index`/`__newindex`
//! aware paths live in the operator dispatcher. Iteration order (used by
//! `next`/`pairs`) follows the physical layout: array slots ascending,
//! then string keys in insertion order, then generic keys in insertion
//! order.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{LuaError, LuaResult};
use crate::value::{LuaValue, TableRef};

pub struct Table {
    /// Array part. Slot 0 is a reserved nil sentinel; integer key `k`
    /// lives at `arr[k]`.
    arr: Vec<LuaValue>,
    str_map: HashMap<Rc<str>, LuaValue>,
    /// Insertion order of the live string keys.
    str_order: Vec<Rc<str>>,
    /// Generic part: aligned key/value vectors, scanned linearly.
    misc_keys: Vec<LuaValue>,
    misc_vals: Vec<LuaValue>,
    pub metatable: Option<TableRef>,
}

/// View a number as an array-part index (an exact integer >= 1).
fn array_index(n: f64) -> Option<usize> {
    if n >= 1.0 && n.floor() == n && n <= u32::MAX as f64 {
        Some(n as usize)
    } else {
        None
    }
}

impl Table {
    pub fn new() -> Self {
        Table {
            arr: vec![LuaValue::Nil],
            str_map: HashMap::new(),
            str_order: Vec::new(),
            misc_keys: Vec::new(),
            misc_vals: Vec::new(),
            metatable: None,
        }
    }

    /// Build a table from a value sequence (1-based).
    pub fn from_values(values: Vec<LuaValue>) -> Self {
        let mut t = Table::new();
        t.arr.extend(values);
        t
    }

    /// Metatable-blind read.
    pub fn raw_get(&self, key: &LuaValue) -> LuaValue {
        match key {
            LuaValue::Nil => LuaValue::Nil,
            LuaValue::Number(n) => {
                if let Some(i) = array_index(*n) {
                    if i < self.arr.len() {
                        return self.arr[i].clone();
                    }
                }
                self.misc_get(key)
            }
            LuaValue::Str(s) => self.str_map.get(s).cloned().unwrap_or(LuaValue::Nil),
            _ => self.misc_get(key),
        }
    }

    pub fn raw_get_str(&self, key: &str) -> LuaValue {
        self.str_map.get(key).cloned().unwrap_or(LuaValue::Nil)
    }

    pub fn raw_get_int(&self, i: usize) -> LuaValue {
        self.raw_get(&LuaValue::Number(i as f64))
    }

    /// Metatable-blind write. Rejects nil and NaN keys; writing nil
    /// clears the slot.
    pub fn raw_set(&mut self, key: LuaValue, value: LuaValue) -> LuaResult<()> {
        match &key {
            LuaValue::Nil => return Err(LuaError::runtime("table index is nil")),
            LuaValue::Number(n) if n.is_nan() => {
                return Err(LuaError::runtime("table index is NaN"))
            }
            _ => {}
        }
        match &key {
            LuaValue::Number(n) => {
                if let Some(i) = array_index(*n) {
                    if i < self.arr.len() {
                        self.arr[i] = value;
                        return Ok(());
                    }
                    if i == self.arr.len() && !value.is_nil() {
                        self.arr.push(value);
                        self.migrate_from_misc();
                        return Ok(());
                    }
                }
                self.misc_set(key, value);
            }
            LuaValue::Str(s) => {
                if value.is_nil() {
                    if self.str_map.remove(s).is_some() {
                        self.str_order.retain(|k| k != s);
                    }
                } else if self.str_map.insert(s.clone(), value).is_none() {
                    self.str_order.push(s.clone());
                }
            }
            _ => self.misc_set(key, value),
        }
        Ok(())
    }

    pub fn raw_set_str(&mut self, key: &str, value: LuaValue) {
        let k: Rc<str> = Rc::from(key);
        // Infallible: a string key is never nil or NaN.
        let _ = self.raw_set(LuaValue::Str(k), value);
    }

    pub fn raw_set_int(&mut self, i: usize, value: LuaValue) {
        let _ = self.raw_set(LuaValue::Number(i as f64), value);
    }

    fn misc_get(&self, key: &LuaValue) -> LuaValue {
        for (i, k) in self.misc_keys.iter().enumerate() {
            if k.raw_eq(key) {
                return self.misc_vals[i].clone();
            }
        }
        LuaValue::Nil
    }

    fn misc_set(&mut self, key: LuaValue, value: LuaValue) {
        if let Some(i) = self.misc_keys.iter().position(|k| k.raw_eq(&key)) {
            if value.is_nil() {
                self.misc_keys.remove(i);
                self.misc_vals.remove(i);
            } else {
                self.misc_vals[i] = value;
            }
        } else if !value.is_nil() {
            self.misc_keys.push(key);
            self.misc_vals.push(value);
        }
    }

    /// After appending to the array part, pull in integer keys from the
    /// generic part that have become contiguous.
    fn migrate_from_misc(&mut self) {
        loop {
            let next = LuaValue::Number(self.arr.len() as f64);
            match self.misc_keys.iter().position(|k| k.raw_eq(&next)) {
                Some(i) => {
                    self.misc_keys.remove(i);
                    let v = self.misc_vals.remove(i);
                    self.arr.push(v);
                }
                None => break,
            }
        }
    }

    /// The `#` border: the largest `n` with `t[n]` present and `t[n+1]`
    /// absent. When the array part ends in a hole the boundary is found
    /// by binary search (after `luaH_getn`); otherwise the border may
    /// extend through integer keys spilled into the generic part.
    pub fn border(&self) -> usize {
        let n = self.arr.len() - 1;
        if n > 0 && self.arr[n].is_nil() {
            let (mut lo, mut hi) = (0usize, n);
            while hi - lo > 1 {
                let mid = (lo + hi) / 2;
                if self.arr[mid].is_nil() {
                    hi = mid;
                } else {
                    lo = mid;
                }
            }
            return lo;
        }
        let mut k = n;
        while !self.misc_get(&LuaValue::Number((k + 1) as f64)).is_nil() {
            k += 1;
        }
        k
    }

    /// Successor of `key` in the physical layout, for `next`/`pairs`.
    /// `None` key starts the traversal; `Ok(None)` ends it.
    pub fn next_entry(&self, key: &LuaValue) -> LuaResult<Option<(LuaValue, LuaValue)>> {
        enum Cursor {
            Arr(usize),
            Str(usize),
            Misc(usize),
        }
        let cursor = match key {
            LuaValue::Nil => Cursor::Arr(1),
            LuaValue::Number(n) => match array_index(*n) {
                Some(i) if i < self.arr.len() => Cursor::Arr(i + 1),
                _ => match self.misc_keys.iter().position(|k| k.raw_eq(key)) {
                    Some(i) => Cursor::Misc(i + 1),
                    None => return Err(LuaError::runtime("invalid key to 'next'")),
                },
            },
            LuaValue::Str(s) => match self.str_order.iter().position(|k| k == s) {
                Some(i) => Cursor::Str(i + 1),
                None => return Err(LuaError::runtime("invalid key to 'next'")),
            },
            _ => match self.misc_keys.iter().position(|k| k.raw_eq(key)) {
                Some(i) => Cursor::Misc(i + 1),
                None => return Err(LuaError::runtime("invalid key to 'next'")),
            },
        };
        let (arr_from, str_from, misc_from) = match cursor {
            Cursor::Arr(i) => (i, 0, 0),
            Cursor::Str(i) => (self.arr.len(), i, 0),
            Cursor::Misc(i) => (self.arr.len(), self.str_order.len(), i),
        };
        for i in arr_from..self.arr.len() {
            if !self.arr[i].is_nil() {
                return Ok(Some((LuaValue::Number(i as f64), self.arr[i].clone())));
            }
        }
        for i in str_from..self.str_order.len() {
            let k = &self.str_order[i];
            if let Some(v) = self.str_map.get(k) {
                return Ok(Some((LuaValue::Str(k.clone()), v.clone())));
            }
        }
        for i in misc_from..self.misc_keys.len() {
            return Ok(Some((self.misc_keys[i].clone(), self.misc_vals[i].clone())));
        }
        Ok(None)
    }

    /// `table.insert(t, pos, v)`: shift `[pos..border]` up by one.
    pub fn insert_at(&mut self, pos: usize, value: LuaValue) -> LuaResult<()> {
        let n = self.border();
        if pos < 1 || pos > n + 1 {
            return Err(LuaError::bad_argument_msg(2, "insert", "position out of bounds"));
        }
        let mut i = n + 1;
        while i > pos {
            let prev = self.raw_get_int(i - 1);
            self.raw_set_int(i, prev);
            i -= 1;
        }
        self.raw_set(LuaValue::Number(pos as f64), value)
    }

    /// `table.remove(t, pos)`: shift `[pos+1..border]` down, return the
    /// removed value. An empty table yields nil.
    pub fn remove_at(&mut self, pos: usize) -> LuaResult<LuaValue> {
        let n = self.border();
        if n == 0 && (pos == 0 || pos == 1) {
            return Ok(LuaValue::Nil);
        }
        if pos < 1 || pos > n + 1 {
            return Err(LuaError::bad_argument_msg(2, "remove", "position out of bounds"));
        }
        let removed = self.raw_get_int(pos);
        for i in pos..n {
            let next = self.raw_get_int(i + 1);
            self.raw_set_int(i, next);
        }
        if pos <= n {
            self.raw_set_int(n, LuaValue::Nil);
        }
        Ok(removed)
    }

    /// Number of live entries across all parts (used by diagnostics and
    /// library merge helpers, not by `#`).
    pub fn entry_count(&self) -> usize {
        self.arr.iter().skip(1).filter(|v| !v.is_nil()).count()
            + self.str_map.len()
            + self.misc_keys.len()
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> LuaValue {
        LuaValue::Number(n)
    }

    #[test]
    fn array_part_round_trip() {
        let mut t = Table::new();
        t.raw_set(num(1.0), LuaValue::str("a")).unwrap();
        t.raw_set(num(2.0), LuaValue::str("b")).unwrap();
        assert_eq!(t.raw_get(&num(1.0)), LuaValue::str("a"));
        assert_eq!(t.raw_get(&num(2.0)), LuaValue::str("b"));
        assert_eq!(t.border(), 2);
    }

    #[test]
    fn nil_key_rejected() {
        let mut t = Table::new();
        assert!(t.raw_set(LuaValue::Nil, num(1.0)).is_err());
        assert!(t.raw_set(num(f64::NAN), num(1.0)).is_err());
    }

    #[test]
    fn clearing_creates_hole_and_border_searches() {
        let mut t = Table::new();
        for i in 1..=8 {
            t.raw_set(num(i as f64), num(i as f64)).unwrap();
        }
        t.raw_set(num(8.0), LuaValue::Nil).unwrap();
        assert_eq!(t.border(), 7);
        t.raw_set(num(4.0), LuaValue::Nil).unwrap();
        let b = t.border();
        // Any boundary adjacent to a hole is a valid border.
        assert!(b == 3 || b == 7, "unexpected border {}", b);
    }

    #[test]
    fn sparse_key_spills_to_generic_then_migrates() {
        let mut t = Table::new();
        t.raw_set(num(1.0), num(10.0)).unwrap();
        t.raw_set(num(3.0), num(30.0)).unwrap();
        assert_eq!(t.raw_get(&num(3.0)), num(30.0));
        assert_eq!(t.border(), 1);
        t.raw_set(num(2.0), num(20.0)).unwrap();
        // 3 migrates into the array part; the border now covers it.
        assert_eq!(t.border(), 3);
        assert_eq!(t.raw_get(&num(3.0)), num(30.0));
    }

    #[test]
    fn fractional_and_negative_keys_use_generic_part() {
        let mut t = Table::new();
        t.raw_set(num(1.5), LuaValue::str("x")).unwrap();
        t.raw_set(num(-2.0), LuaValue::str("y")).unwrap();
        t.raw_set(LuaValue::Boolean(true), LuaValue::str("z")).unwrap();
        assert_eq!(t.raw_get(&num(1.5)), LuaValue::str("x"));
        assert_eq!(t.raw_get(&num(-2.0)), LuaValue::str("y"));
        assert_eq!(t.raw_get(&LuaValue::Boolean(true)), LuaValue::str("z"));
        assert_eq!(t.border(), 0);
    }

    #[test]
    fn string_part_preserves_insertion_order() {
        let mut t = Table::new();
        t.raw_set_str("b", num(1.0));
        t.raw_set_str("a", num(2.0));
        t.raw_set_str("c", num(3.0));
        t.raw_set_str("a", LuaValue::Nil);
        let first = t.next_entry(&LuaValue::Nil).unwrap().unwrap();
        assert_eq!(first.0, LuaValue::str("b"));
        let second = t.next_entry(&first.0).unwrap().unwrap();
        assert_eq!(second.0, LuaValue::str("c"));
        assert!(t.next_entry(&second.0).unwrap().is_none());
    }

    #[test]
    fn next_walks_all_parts_in_layout_order() {
        let mut t = Table::new();
        t.raw_set(num(1.0), num(10.0)).unwrap();
        t.raw_set(num(2.0), num(20.0)).unwrap();
        t.raw_set_str("k", num(30.0));
        t.raw_set(LuaValue::Boolean(false), num(40.0)).unwrap();
        let mut seen = Vec::new();
        let mut key = LuaValue::Nil;
        while let Some((k, _)) = t.next_entry(&key).unwrap() {
            seen.push(k.clone());
            key = k;
        }
        assert_eq!(
            seen,
            vec![num(1.0), num(2.0), LuaValue::str("k"), LuaValue::Boolean(false)]
        );
    }

    #[test]
    fn insert_shifts_up() {
        let mut t = Table::from_values(vec![num(10.0), num(20.0), num(30.0)]);
        t.insert_at(2, num(99.0)).unwrap();
        assert_eq!(t.raw_get(&num(2.0)), num(99.0));
        assert_eq!(t.raw_get(&num(3.0)), num(20.0));
        assert_eq!(t.border(), 4);
    }

    #[test]
    fn remove_on_empty_is_nil() {
        let mut t = Table::new();
        assert_eq!(t.remove_at(1).unwrap(), LuaValue::Nil);
        assert_eq!(t.border(), 0);
    }

    #[test]
    fn remove_shifts_down() {
        let mut t = Table::from_values(vec![num(1.0), num(2.0), num(3.0)]);
        let gone = t.remove_at(1).unwrap();
        assert_eq!(gone, num(1.0));
        assert_eq!(t.raw_get(&num(1.0)), num(2.0));
        assert_eq!(t.border(), 2);
    }
}
