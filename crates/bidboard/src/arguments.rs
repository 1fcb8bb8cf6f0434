use {
    std::{
        fmt::{self, Display, Formatter},
        net::SocketAddr,
        time::Duration,
    },
    tracing::level_filters::LevelFilter,
    url::Url,
};

#[derive(clap::Parser)]
pub struct Arguments {
    #[clap(long, env, default_value = "warn,bidboard=debug,database=debug")]
    pub log_filter: String,

    /// Minimum log level that is additionally mirrored to stderr.
    #[clap(long, env, default_value = "error")]
    pub log_stderr_threshold: LevelFilter,

    #[clap(long, env, default_value = "0.0.0.0:8080")]
    pub bind_address: SocketAddr,

    /// Url of the Postgres database. By default connects to locally running
    /// postgres.
    #[clap(long, env, default_value = "postgresql://")]
    pub db_url: Url,

    /// Create missing tables and types on startup. Disable when a separate
    /// migration pipeline owns the schema.
    #[clap(long, env, action = clap::ArgAction::Set, default_value = "true")]
    pub db_ensure_schema: bool,

    /// How long a submission may wait for a lot's exclusive section before
    /// failing with Busy. Bounds worst-case latency under bid storms.
    #[clap(
        long,
        env,
        default_value = "5s",
        value_parser = humantime::parse_duration,
    )]
    pub lot_lock_timeout: Duration,

    /// Cap on system raises per submission. A legitimate cascade terminates
    /// on its own; the cap only guards against corrupted auto-bid
    /// configuration.
    #[clap(long, env, default_value = "100")]
    pub max_cascade_depth: usize,

    /// Buffered events per fan-out subscriber before lagging clients start
    /// losing pushes and have to backfill.
    #[clap(long, env, default_value = "1024")]
    pub event_buffer_size: usize,

    /// Payment capture webhook invoked with the winning bid once a lot
    /// closes. Winners are only logged when unset.
    #[clap(long, env)]
    pub payment_capture_url: Option<Url>,

    #[clap(
        long,
        env,
        default_value = "10s",
        value_parser = humantime::parse_duration,
    )]
    pub payment_capture_timeout: Duration,
}

pub fn display_option(
    f: &mut Formatter<'_>,
    name: &str,
    option: &Option<impl Display>,
) -> fmt::Result {
    write!(f, "{name}: ")?;
    match option {
        Some(display) => writeln!(f, "{display}"),
        None => writeln!(f, "None"),
    }
}

impl Display for Arguments {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Self {
            log_filter,
            log_stderr_threshold,
            bind_address,
            db_url,
            db_ensure_schema,
            lot_lock_timeout,
            max_cascade_depth,
            event_buffer_size,
            payment_capture_url,
            payment_capture_timeout,
        } = self;

        writeln!(f, "log_filter: {log_filter}")?;
        writeln!(f, "log_stderr_threshold: {log_stderr_threshold}")?;
        writeln!(f, "bind_address: {bind_address}")?;
        writeln!(f, "db_url: {db_url}")?;
        writeln!(f, "db_ensure_schema: {db_ensure_schema}")?;
        writeln!(f, "lot_lock_timeout: {lot_lock_timeout:?}")?;
        writeln!(f, "max_cascade_depth: {max_cascade_depth}")?;
        writeln!(f, "event_buffer_size: {event_buffer_size}")?;
        display_option(f, "payment_capture_url", payment_capture_url)?;
        writeln!(f, "payment_capture_timeout: {payment_capture_timeout:?}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, clap::Parser};

    #[test]
    fn defaults_parse() {
        let args = Arguments::parse_from(["bidboard"]);
        assert_eq!(args.bind_address.port(), 8080);
        assert_eq!(args.lot_lock_timeout, Duration::from_secs(5));
        assert_eq!(args.max_cascade_depth, 100);
        assert!(args.payment_capture_url.is_none());
        // The startup log renders every field.
        let rendered = args.to_string();
        assert!(rendered.contains("lot_lock_timeout"));
        assert!(rendered.contains("payment_capture_url: None"));
    }
}
