mod failure;
mod multi_session;
mod persist;
mod seek;
mod teardown;
