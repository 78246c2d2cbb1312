// SPDX-License-Identifier: BSD-3-Clause
//! Allocator and copy signatures, keyed by regular expressions over callee
//! names.

use std::collections::HashMap;

use regex::RegexSet;

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Signature {
    /// Returns `size` bytes.
    Alloc { size: usize },
    /// Returns `args[count]` elements of `args[count + 1]` bytes each.
    ArrayAlloc { count: usize },
    /// Copies `size` bytes out of `src`.
    Copy { src: usize, size: usize },
}

#[derive(Debug)]
pub struct Signatures {
    sigs: HashMap<String, Vec<Signature>>,
    regexes: Vec<String>,
    set: RegexSet,
}

impl Default for Signatures {
    fn default() -> Self {
        Signatures {
            sigs: HashMap::new(),
            regexes: Vec::new(),
            set: RegexSet::empty(),
        }
    }
}

fn exact(name: &str) -> String {
    format!("^{}$", regex::escape(name))
}

impl Signatures {
    pub fn new(sigs: HashMap<String, Vec<Signature>>) -> Result<Self, regex::Error> {
        let regexes: Vec<String> = sigs.keys().map(|s| s.to_string()).collect();
        let set = RegexSet::new(&regexes)?;
        Ok(Signatures { sigs, regexes, set })
    }

    /// The allocators every build knows about, plus the kernel ones when
    /// `kernel` is set.
    pub fn builtin(kernel: bool) -> Self {
        let mut table: Vec<(&str, Signature)> = vec![
            ("malloc", Signature::Alloc { size: 0 }),
            ("memdup", Signature::Alloc { size: 1 }),
            ("realloc", Signature::Alloc { size: 1 }),
            ("calloc", Signature::ArrayAlloc { count: 0 }),
        ];
        if kernel {
            for name in ["kmalloc", "kzalloc", "vmalloc", "__vmalloc"] {
                table.push((name, Signature::Alloc { size: 0 }));
            }
            for name in [
                "sock_kmalloc",
                "kmemdup",
                "memdup_user",
                "dma_alloc_attrs",
                "dma_alloc_coherent",
                "devm_kmalloc",
                "devm_kzalloc",
                "krealloc",
            ] {
                table.push((name, Signature::Alloc { size: 1 }));
            }
            table.push(("kcalloc", Signature::ArrayAlloc { count: 0 }));
            table.push(("kmalloc_array", Signature::ArrayAlloc { count: 0 }));
            table.push(("devm_kcalloc", Signature::ArrayAlloc { count: 1 }));
            for name in ["copy_from_user", "__copy_from_user"] {
                table.push((name, Signature::Copy { src: 1, size: 2 }));
            }
        }
        let mut sigs: HashMap<String, Vec<Signature>> = HashMap::new();
        for (name, sig) in table {
            sigs.entry(exact(name)).or_default().push(sig);
        }
        // The patterns above are escaped literals.
        Signatures::new(sigs).unwrap_or_default()
    }

    /// Adds `other`'s entries; a pattern present in both gets both lists.
    pub fn extend(self, other: HashMap<String, Vec<Signature>>) -> Result<Self, regex::Error> {
        let mut sigs = self.sigs;
        for (k, v) in other {
            let entry = sigs.entry(k).or_default();
            for s in v {
                if !entry.contains(&s) {
                    entry.push(s);
                }
            }
        }
        Signatures::new(sigs)
    }

    pub fn has_signatures_for(&self, func: &str) -> bool {
        self.set.is_match(func)
    }

    pub fn signatures_for(&self, func: &str) -> Option<Vec<Signature>> {
        let mut matched = false;
        let mut sigs = Vec::new();
        for m in self.set.matches(func) {
            matched = true;
            sigs.extend(self.sigs[&self.regexes[m]].clone());
        }
        if matched {
            Some(sigs)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{Signature, Signatures};

    #[test]
    fn empty_table_matches_nothing() {
        let sigs = Signatures::new(HashMap::from([]));
        assert_eq!(None, sigs.unwrap().signatures_for("f"));
    }

    #[test]
    fn builtins_are_anchored() {
        let sigs = Signatures::builtin(false);
        assert_eq!(
            Some(vec![Signature::Alloc { size: 0 }]),
            sigs.signatures_for("malloc")
        );
        assert_eq!(None, sigs.signatures_for("my_malloc"));
        assert_eq!(None, sigs.signatures_for("kmalloc"));
        let kernel = Signatures::builtin(true);
        assert_eq!(
            Some(vec![Signature::ArrayAlloc { count: 1 }]),
            kernel.signatures_for("devm_kcalloc")
        );
        assert_eq!(
            Some(vec![Signature::Copy { src: 1, size: 2 }]),
            kernel.signatures_for("copy_from_user")
        );
    }

    #[test]
    fn user_tables_extend_builtins() {
        let json = r#"{"^xalloc_.*$": [{"alloc": {"size": 1}}]}"#;
        let user: HashMap<String, Vec<Signature>> = serde_json::from_str(json).unwrap();
        let sigs = Signatures::builtin(false).extend(user).unwrap();
        assert!(sigs.has_signatures_for("malloc"));
        assert_eq!(
            Some(vec![Signature::Alloc { size: 1 }]),
            sigs.signatures_for("xalloc_buf")
        );
    }

    #[test]
    fn bad_patterns_are_errors() {
        let user = HashMap::from([("(".to_string(), vec![Signature::Alloc { size: 0 }])]);
        assert!(Signatures::new(user).is_err());
    }
}
