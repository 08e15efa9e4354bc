/// Line-oriented text listings of decoded files
pub mod dump;
