mod localfs;
mod nullfs;
