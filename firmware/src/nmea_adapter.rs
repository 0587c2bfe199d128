use clock_engine::config::FIX_AGE_INVALID;
use clock_engine::gps::{
    FixError, GpsAdapter, UtcFix, utc_from_calendar, validate_fix, year_start_utc,
};
use defmt::{debug, trace};
use embassy_time::Instant;
use nmea0183::{ParseResult, Parser, Sentence};

/// Decodes RMC sentences. The fix age is measured from the moment the
/// sentence was completed.
pub struct NmeaAdapter {
    parser: Parser,
    last_fix: Option<(i64, Instant)>,
    earliest_utc: i64,
}

impl NmeaAdapter {
    pub fn new(build_year: i32) -> Self {
        Self {
            parser: Parser::new().sentence_filter(Sentence::RMC),
            last_fix: None,
            earliest_utc: year_start_utc(build_year),
        }
    }
}

impl GpsAdapter for NmeaAdapter {
    fn feed(&mut self, byte: u8) -> bool {
        match self.parser.parse_from_byte(byte) {
            Some(Ok(ParseResult::RMC(Some(rmc)))) => {
                let nmea0183::datetime::Date { day, month, year } = rmc.datetime.date;
                let nmea0183::datetime::Time {
                    hours,
                    minutes,
                    seconds,
                } = rmc.datetime.time;
                trace!(
                    "rmc {}:{}:{} {}-{}-{}",
                    hours, minutes, seconds, day, month, year
                );
                self.last_fix = utc_from_calendar(
                    year as i32,
                    month as u8,
                    day as u8,
                    hours,
                    minutes,
                    seconds as u8,
                )
                .map(|utc| (utc, Instant::now()));
                true
            }
            // Receiver is talking but has no fix
            Some(Ok(ParseResult::RMC(None))) => {
                self.last_fix = None;
                true
            }
            Some(Ok(_)) => false,
            Some(Err(e)) => {
                debug!("NMEA parse error: {}", e);
                false
            }
            None => false,
        }
    }

    fn read_fix(&self) -> Result<UtcFix, FixError> {
        let (utc, age_ms) = match self.last_fix {
            Some((utc, decoded)) => {
                let age = decoded.elapsed().as_millis();
                (utc, age.min(u64::from(FIX_AGE_INVALID - 1)) as u32)
            }
            None => (0, FIX_AGE_INVALID),
        };
        validate_fix(utc, age_ms, self.earliest_utc)
    }
}
