mod categories;
mod logs;
mod tags;
