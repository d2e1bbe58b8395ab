pub mod tables {

    pub const MOVIES: &str = "movies";

    pub const TV_SHOWS: &str = "tv_shows";

    pub const MOVIE_CAST: &str = "movie_cast";

    pub const MOVIE_CREW: &str = "movie_crew";

    pub const TV_SHOW_CAST: &str = "tv_show_cast";

    pub const TV_SHOW_CREW: &str = "tv_show_crew";

    pub const LAST_UPDATES: &str = "last_updates";

    /// Tables copied into each snapshot set by default.
    pub const LIVE: &[&str] = &[
        MOVIES,
        TV_SHOWS,
        MOVIE_CAST,
        MOVIE_CREW,
        TV_SHOW_CAST,
        TV_SHOW_CREW,
        LAST_UPDATES,
    ];

    /// `(child, parent)` pairs; child rows are deleted with their parent row.
    pub const CASCADES: &[(&str, &str)] = &[
        (MOVIE_CAST, MOVIES),
        (MOVIE_CREW, MOVIES),
        (TV_SHOW_CAST, TV_SHOWS),
        (TV_SHOW_CREW, TV_SHOWS),
    ];
}

pub mod snapshot {

    pub const NAMESPACE_PREFIX: &str = "rollback_";

    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

    /// Length of a formatted snapshot timestamp, e.g. `20261018_030000`.
    pub const TIMESTAMP_LEN: usize = 15;
}

pub mod backup {

    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

    pub const EXTENSION: &str = "db";
}

pub mod limits {

    /// Rows per INSERT statement; keeps bound parameters under SQLite's limit.
    pub const INSERT_CHUNK: usize = 100;

    /// Longest lookback accepted from the CLI or config, about a century.
    pub const MAX_LOOKBACK_DAYS: u32 = 36_500;

    /// Safety net against a change feed that never reports its last page.
    pub const MAX_CHANGE_PAGES: u32 = 500;
}

pub const USER_AGENT: &str = concat!("reelsync/", env!("CARGO_PKG_VERSION"));
