//! Scenario tests running whole coadds through the public driver.
