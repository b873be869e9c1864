use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};

/// Modification time in the two 16-bit MS-DOS fields used by the records.
///
/// Resolution is two seconds. Times before 1980 clamp to 1980-01-01 00:00:00
/// and times after 2107 clamp to 2107-12-31 23:59:58.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl Default for DosDateTime {
    fn default() -> Self {
        Self::MIN
    }
}

impl DosDateTime {
    /// 1980-01-01 00:00:00
    pub const MIN: DosDateTime = DosDateTime {
        time: 0,
        date: (1 << 5) | 1,
    };

    /// 2107-12-31 23:59:58
    pub const MAX: DosDateTime = DosDateTime {
        time: (23 << 11) | (59 << 5) | 29,
        date: (127 << 9) | (12 << 5) | 31,
    };

    /// Reads the local wall clock.
    pub fn now() -> Self {
        Self::encode(Local::now().naive_local())
    }

    pub fn encode(dt: NaiveDateTime) -> Self {
        match dt.year() {
            year if year < 1980 => Self::MIN,
            year if year > 2107 => Self::MAX,
            year => {
                let time = (dt.hour() << 11) | (dt.minute() << 5) | (dt.second() / 2);
                let date = (((year - 1980) as u32) << 9) | (dt.month() << 5) | dt.day();
                Self {
                    time: time as u16,
                    date: date as u16,
                }
            }
        }
    }

    /// Returns `None` when the fields do not name a real calendar time.
    pub fn decode(self) -> Option<NaiveDateTime> {
        let year = 1980 + i32::from(self.date >> 9);
        let month = u32::from((self.date >> 5) & 0x0F);
        let day = u32::from(self.date & 0x1F);
        let hour = u32::from(self.time >> 11);
        let minute = u32::from((self.time >> 5) & 0x3F);
        let second = u32::from(self.time & 0x1F) * 2;
        NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
    }
}
