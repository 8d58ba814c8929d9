//! Static catalog contents
//!
//! Category lists and collection prefixes follow the published material
//! for each system. Keyword weights are hand-tuned: 1.0 terms are unique
//! to the system, lighter terms are shared RPG vocabulary.

use super::{Book, Catalog, Edition, GameSystem, Keyword, TitleSynonym};

/// Categories used when a game has no specific taxonomy
pub const GENERIC_CATEGORIES: &[&str] = &[
    "Character",
    "Combat",
    "Magic",
    "Equipment",
    "Rules",
    "Tables",
    "Lore",
];

const NOVEL_CATEGORIES: &[&str] = &[
    "Chapter/Section",
    "Dialogue",
    "Description",
    "Action",
    "Internal Monologue",
    "Narrative",
];

fn kw(term: &'static str, weight: f64) -> Keyword {
    Keyword { term, weight }
}

fn book(code: &'static str, title: &'static str) -> Book {
    Book { code, title }
}

pub(super) fn build() -> Catalog {
    let games = vec![
        GameSystem {
            id: "dnd",
            name: "Dungeons & Dragons",
            prefix: "dnd",
            editions: vec![
                Edition {
                    id: "1st",
                    books: vec![
                        book("phb", "Player's Handbook"),
                        book("dmg", "Dungeon Master's Guide"),
                        book("mm", "Monster Manual"),
                    ],
                },
                Edition {
                    id: "2nd",
                    books: vec![
                        book("phb", "Player's Handbook"),
                        book("dmg", "Dungeon Master Guide"),
                        book("mc", "Monstrous Compendium"),
                    ],
                },
                Edition {
                    id: "5th",
                    books: vec![
                        book("phb", "Player's Handbook"),
                        book("dmg", "Dungeon Master's Guide"),
                        book("mm", "Monster Manual"),
                        book("xgte", "Xanathar's Guide to Everything"),
                    ],
                },
            ],
            keywords: vec![
                kw("thac0", 1.0),
                kw("beholder", 1.0),
                kw("dungeon master", 0.9),
                kw("saving throw", 0.6),
                kw("armor class", 0.6),
                kw("hit dice", 0.5),
                kw("alignment", 0.3),
                kw("d20", 0.3),
            ],
            categories: vec![
                "Character",
                "Combat",
                "Magic",
                "Equipment",
                "Monsters",
                "Rules",
                "Tables",
                "Treasure",
            ],
        },
        GameSystem {
            id: "pathfinder",
            name: "Pathfinder",
            prefix: "pf",
            editions: vec![
                Edition {
                    id: "1e",
                    books: vec![
                        book("crb", "Core Rulebook"),
                        book("apg", "Advanced Player's Guide"),
                        book("b1", "Bestiary"),
                    ],
                },
                Edition {
                    id: "2e",
                    books: vec![
                        book("crb", "Core Rulebook"),
                        book("apg", "Advanced Player's Guide"),
                        book("gmg", "Gamemastery Guide"),
                    ],
                },
            ],
            keywords: vec![
                kw("golarion", 1.0),
                kw("pathfinder society", 1.0),
                kw("archetype", 0.5),
                kw("combat maneuver", 0.5),
                kw("feat", 0.3),
                kw("adventure path", 0.6),
            ],
            categories: vec![
                "Character",
                "Combat",
                "Magic",
                "Equipment",
                "Bestiary",
                "Rules",
                "Tables",
                "Setting",
            ],
        },
        GameSystem {
            id: "coc",
            name: "Call of Cthulhu",
            prefix: "coc",
            editions: vec![
                Edition {
                    id: "6th",
                    books: vec![book("kr", "Keeper's Rulebook")],
                },
                Edition {
                    id: "7th",
                    books: vec![
                        book("kr", "Keeper Rulebook"),
                        book("ih", "Investigator Handbook"),
                    ],
                },
            ],
            keywords: vec![
                kw("sanity", 0.9),
                kw("mythos", 1.0),
                kw("investigator", 0.7),
                kw("keeper", 0.6),
                kw("cthulhu", 1.0),
                kw("elder sign", 0.8),
            ],
            categories: vec![
                "Investigator",
                "Skills",
                "Sanity",
                "Mythos",
                "Spells",
                "Rules",
                "Tables",
                "Scenarios",
            ],
        },
        GameSystem {
            id: "vampire",
            name: "Vampire: The Masquerade",
            prefix: "vtm",
            editions: vec![
                Edition {
                    id: "revised",
                    books: vec![book("core", "Vampire: The Masquerade")],
                },
                Edition {
                    id: "v5",
                    books: vec![book("core", "Vampire: The Masquerade 5th Edition")],
                },
            ],
            keywords: vec![
                kw("masquerade", 0.9),
                kw("camarilla", 1.0),
                kw("discipline", 0.4),
                kw("vitae", 0.9),
                kw("clan", 0.4),
                kw("generation", 0.3),
            ],
            categories: vec![
                "Character",
                "Clans",
                "Disciplines",
                "Combat",
                "Society",
                "Rules",
                "Tables",
                "Storytelling",
            ],
        },
        GameSystem {
            id: "werewolf",
            name: "Werewolf: The Apocalypse",
            prefix: "wta",
            editions: vec![Edition {
                id: "revised",
                books: vec![book("core", "Werewolf: The Apocalypse")],
            }],
            keywords: vec![
                kw("garou", 1.0),
                kw("umbra", 1.0),
                kw("gnosis", 0.9),
                kw("auspice", 0.9),
                kw("tribe", 0.4),
                kw("rage", 0.3),
            ],
            categories: vec![
                "Character",
                "Tribes",
                "Gifts",
                "Combat",
                "Umbra",
                "Rules",
                "Tables",
                "Storytelling",
            ],
        },
        GameSystem {
            id: "cyberpunk",
            name: "Cyberpunk",
            prefix: "cp",
            editions: vec![Edition {
                id: "2020",
                books: vec![book("core", "Cyberpunk 2020")],
            }],
            keywords: vec![
                kw("netrunner", 1.0),
                kw("cyberware", 0.9),
                kw("night city", 1.0),
                kw("chrome", 0.5),
                kw("fixer", 0.4),
            ],
            categories: vec![
                "Character",
                "Combat",
                "Netrunning",
                "Cyberware",
                "Equipment",
                "Rules",
                "Tables",
                "Setting",
            ],
        },
        GameSystem {
            id: "shadowrun",
            name: "Shadowrun",
            prefix: "sr",
            editions: vec![Edition {
                id: "5e",
                books: vec![book("core", "Shadowrun Fifth Edition")],
            }],
            keywords: vec![
                kw("shadowrun", 1.0),
                kw("decker", 0.9),
                kw("awakened", 0.7),
                kw("nuyen", 1.0),
                kw("astral", 0.5),
            ],
            categories: vec![
                "Character",
                "Combat",
                "Matrix",
                "Magic",
                "Equipment",
                "Rules",
                "Tables",
                "Setting",
            ],
        },
    ];

    let synonyms = vec![
        TitleSynonym {
            fragment: "player's handbook",
            game: "dnd",
            edition: "1st",
            book: "phb",
        },
        TitleSynonym {
            fragment: "players handbook",
            game: "dnd",
            edition: "1st",
            book: "phb",
        },
        TitleSynonym {
            fragment: "dungeon master's guide",
            game: "dnd",
            edition: "1st",
            book: "dmg",
        },
        TitleSynonym {
            fragment: "monster manual",
            game: "dnd",
            edition: "1st",
            book: "mm",
        },
        TitleSynonym {
            fragment: "monstrous compendium",
            game: "dnd",
            edition: "2nd",
            book: "mc",
        },
        TitleSynonym {
            fragment: "xanathar's guide",
            game: "dnd",
            edition: "5th",
            book: "xgte",
        },
        TitleSynonym {
            fragment: "pathfinder core rulebook",
            game: "pathfinder",
            edition: "2e",
            book: "crb",
        },
        TitleSynonym {
            fragment: "advanced player's guide",
            game: "pathfinder",
            edition: "2e",
            book: "apg",
        },
        TitleSynonym {
            fragment: "investigator handbook",
            game: "coc",
            edition: "7th",
            book: "ih",
        },
        TitleSynonym {
            fragment: "call of cthulhu",
            game: "coc",
            edition: "7th",
            book: "kr",
        },
        TitleSynonym {
            fragment: "vampire: the masquerade",
            game: "vampire",
            edition: "revised",
            book: "core",
        },
        TitleSynonym {
            fragment: "werewolf: the apocalypse",
            game: "werewolf",
            edition: "revised",
            book: "core",
        },
        TitleSynonym {
            fragment: "cyberpunk 2020",
            game: "cyberpunk",
            edition: "2020",
            book: "core",
        },
        TitleSynonym {
            fragment: "shadowrun",
            game: "shadowrun",
            edition: "5e",
            book: "core",
        },
    ];

    // Jargon the spell corrector must leave alone even though it is
    // absent from the english dictionary.
    let protected_terms = vec![
        "thac0",
        "beholder",
        "tiefling",
        "drow",
        "lich",
        "mindflayer",
        "golarion",
        "cthulhu",
        "mythos",
        "nyarlathotep",
        "camarilla",
        "sabbat",
        "vitae",
        "garou",
        "gnosis",
        "umbra",
        "netrunner",
        "cyberware",
        "nuyen",
        "decker",
        "dweomer",
        "xp",
        "npc",
        "gm",
        "d20",
        "d100",
    ];

    Catalog {
        games,
        synonyms,
        novel_categories: NOVEL_CATEGORIES.to_vec(),
        protected_terms,
    }
}
