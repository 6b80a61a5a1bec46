macro_rules! t {
    ($id:expr, $expr:expr $(,)?) => {
        match $expr {
            Ok(val) => {
                trace!("{} done.", $id);
                Ok(val)
            }
            Err(err) => {
                error!("{} failed: {err:?}", $id);
                Err(err)
            }
        }
    };
}

pub(crate) use t;
