// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-friendly agent names, drawn from per-flavor pools.
//!
//! Claude slots get French names, codex slots get California names. A name
//! stays reserved until [`NamePool::release`] is called for it.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

use crate::slot::AgentFlavor;

/// How many random combinations to try before falling back to a suffix.
const MAX_ATTEMPTS: usize = 100;

const FRENCH_FIRST: &[&str] = &[
    "jacques", "pierre", "jean", "louis", "francois", "antoine", "henri", "michel",
    "philippe", "claude", "laurent", "olivier", "nicolas", "pascal", "rene", "andre",
    "marcel", "etienne", "lucien", "thierry", "yves", "alain", "xavier", "benoit",
    "guillaume", "julien", "maxime", "sebastien", "arnaud", "mathieu", "fabien", "cedric",
    "damien", "stephane", "christophe", "emmanuel", "frederic", "gerard", "hugues",
    "jerome", "kevin", "lionel", "marc", "norbert", "patrice", "quentin", "raymond",
    "sylvain", "tristan", "urbain", "valentin", "wilfried", "yannick", "zacharie",
    "adrien", "bastien", "cyril", "didier", "edouard", "florian", "gaston", "herve",
    "ismael", "joel", "kilian", "loic", "matthias", "noel", "octave", "paul", "raphael",
    "serge", "thibault", "ulysse", "vincent", "william", "yoann", "alexis", "bruno",
    "camille", "denis", "eric", "felix", "gilles", "hubert", "ivan", "joseph", "leo",
    "marius", "nathan", "oscar", "prosper", "regis", "samuel", "theo", "victor", "willy",
    "yanis", "aurelien", "baptiste",
];

const FRENCH_LAST: &[&str] = &[
    "bernard", "dubois", "moreau", "laurent", "simon", "michel", "lefevre", "leroy",
    "roux", "david", "bertrand", "morel", "girard", "andre", "lecomte", "fournier",
    "mercier", "dupont", "lambert", "bonnet", "fontaine", "rousseau", "vincent", "muller",
    "legrand", "garnier", "chevalier", "clement", "blanchard", "gauthier", "perrin",
    "robin", "masson", "sanchez", "henry", "duval", "denis", "lemaire", "lucas",
    "martinez", "petit", "marchand", "durand", "marie", "picard", "richard", "thomas",
    "robert", "garcia", "barbier", "rodriguez", "brunet", "martin", "renard", "arnaud",
    "leroux", "colin", "vidal", "dupuis", "faure", "guillot", "gautier", "roger",
    "benoit", "lacroix", "meyer", "hubert", "rey", "jean", "maillard", "baron", "boyer",
    "perrot", "guerin", "philippe", "leblanc", "carpentier", "charles", "renaud",
    "dumas", "olivier", "aubert", "pons", "brun", "gaillard", "noel", "louis", "pierre",
    "mathieu", "charpentier", "fabre", "moulin", "adam", "berger", "roy", "giraud",
    "leclerc", "caron", "collet", "prevost",
];

const CALIFORNIA_FIRST: &[&str] = &[
    "chad", "brad", "brock", "bryce", "trent", "cody", "kyle", "blake", "derek", "tyler",
    "hunter", "skyler", "chase", "austin", "ryan", "dustin", "travis", "troy", "dillon",
    "colton", "logan", "mason", "jayden", "kayden", "cooper", "tucker", "walker",
    "parker", "tanner", "gunner", "bronson", "canyon", "cliff", "dallas", "denver",
    "easton", "ford", "gage", "hawk", "jace", "kane", "lance", "maverick", "nash",
    "oakley", "paxton", "quinn", "ryder", "sawyer", "thor", "wade", "zane", "ashton",
    "beckett", "cash", "dax", "finn", "grayson", "hayes", "jett", "knox", "levi",
    "maddox", "nolan", "phoenix", "reed", "steele", "tate", "vance", "weston", "xander",
    "yates", "zeke", "ace", "bodhi", "colt", "duke", "eli", "fletcher", "grady", "heath",
    "ivan", "jake", "keaton", "lane", "miles", "nico", "otto", "pierce", "reese",
    "shane", "trey", "urban", "vaughn", "wolf", "xavier", "yuma", "zander", "axel",
];

const CALIFORNIA_LAST: &[&str] = &[
    "stevenson", "anderson", "peterson", "johnson", "williamson", "henderson",
    "richardson", "davidson", "morrison", "harrison", "thornton", "preston", "lawson",
    "bronson", "ashton", "dalton", "grayson", "winston", "clifton", "carlton",
    "bradford", "stanford", "crawford", "hartford", "stratford", "wellington",
    "bennington", "harrington", "worthington", "huntington", "barrington", "lexington",
    "remington", "covington", "paddington", "kensington", "livingston", "kingston",
    "princeton", "weston", "easton", "shelton", "walton", "sutton", "norton", "fulton",
    "colton", "bolton", "holton", "melton", "ashford", "langford", "sanford", "radford",
    "beaumont", "claremont", "fremont", "piedmont", "belmont", "blackwell", "caldwell",
    "hartwell", "rockwell", "cromwell", "whitfield", "mayfield", "fairfield",
    "westfield", "springfield", "brooks", "rivers", "stone", "hill", "woods", "sterling",
    "golden", "silver", "hunter", "archer", "fletcher", "carter", "mason", "taylor",
    "cooper", "brewer", "fisher", "marshall", "porter", "chandler", "foster", "butler",
    "turner", "palmer", "parker", "sawyer", "spencer", "tucker", "weaver",
];

struct PoolState {
    rng: StdRng,
    used: HashSet<String>,
}

/// Thread-safe allocator of unique `first-last` agent names.
pub struct NamePool {
    state: Mutex<PoolState>,
}

impl NamePool {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Seeded constructor for deterministic tests.
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            state: Mutex::new(PoolState { rng, used: HashSet::new() }),
        }
    }

    /// Generate a unique name for the given flavor.
    ///
    /// Tries `MAX_ATTEMPTS` random combinations; when the pool is exhausted
    /// a random numeric suffix is appended instead.
    pub fn generate(&self, flavor: AgentFlavor) -> String {
        let (first, last) = pools_for(flavor);
        let mut state = self.state.lock();

        for _ in 0..MAX_ATTEMPTS {
            let name = format!(
                "{}-{}",
                first[state.rng.random_range(0..first.len())],
                last[state.rng.random_range(0..last.len())],
            );
            if !state.used.contains(&name) {
                state.used.insert(name.clone());
                return name;
            }
        }

        let name = format!(
            "{}-{}-{}",
            first[state.rng.random_range(0..first.len())],
            last[state.rng.random_range(0..last.len())],
            state.rng.random_range(0..1000),
        );
        state.used.insert(name.clone());
        name
    }

    /// Make a name available again (slot destroyed).
    pub fn release(&self, name: &str) {
        self.state.lock().used.remove(name);
    }

    /// Reserve a name without generating it (crash recovery).
    pub fn mark_used(&self, name: &str) {
        self.state.lock().used.insert(name.to_string());
    }

    /// Whether a name is currently reserved.
    pub fn is_used(&self, name: &str) -> bool {
        self.state.lock().used.contains(name)
    }
}

impl Default for NamePool {
    fn default() -> Self {
        Self::new()
    }
}

fn pools_for(flavor: AgentFlavor) -> (&'static [&'static str], &'static [&'static str]) {
    match flavor {
        AgentFlavor::Claude => (FRENCH_FIRST, FRENCH_LAST),
        AgentFlavor::Codex => (CALIFORNIA_FIRST, CALIFORNIA_LAST),
    }
}

#[cfg(test)]
#[path = "names_tests.rs"]
mod tests;
