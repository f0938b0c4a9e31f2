mod config;
mod help;
mod info;
pub mod panels;
mod points;
mod utils;
mod voice;

use crate::discord::{Data, Error};

/// Every command registered with discord.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        help::help(),
        info::about(),
        points::points(),
        points::givepoint(),
        points::setpoint(),
        panels::setupdaily(),
        panels::setupgacha(),
        panels::setimage(),
        config::setdailyamount(),
        config::setrollcost(),
        config::setrollchannel(),
        config::setdailylogchannel(),
        config::setgachalogchannel(),
        voice::addvoicechannel(),
        voice::removevoicechannel(),
        voice::setvoicereward(),
        voice::setmutelimit(),
        voice::voicesettings(),
    ]
}
